//! Lock-free singly-linked list of resting orders.
//!
//! One list exists per (instrument, side). Inserts push to the head with a
//! compare-and-swap retry loop; removal targets a specific node by identity.
//!
//! Removal is claimed by tagging the victim's `next` link: the one thread whose
//! CAS sets the tag owns the order. The node is then snipped out of the chain
//! by whichever thread next walks past it, and only the thread whose snip CAS
//! succeeds hands it to the epoch collector. Memory is therefore released only
//! after every thread pinned at unlink time has unpinned, so a traversal may
//! keep reading a node that was unlinked underneath it.

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use metrics::counter;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use tracing::trace;

use crate::orderbook::types::{OrderRecord, OrderSnapshot};

/// Tag bit on a node's `next` link marking the node as claimed
const CLAIMED: usize = 1;

#[derive(Debug)]
pub struct OrderNode {
    order: OrderRecord,
    next: Atomic<OrderNode>,
}

/// A reference to a node reachable from a list, valid for as long as the
/// guard it was obtained under stays pinned.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'g> {
    ptr: Shared<'g, OrderNode>,
    node: &'g OrderNode,
}

impl<'g> NodeRef<'g> {
    fn same_node(&self, other: Shared<'g, OrderNode>) -> bool {
        self.ptr.as_raw() == other.as_raw()
    }

    /// Whether some thread has already won the removal of this node
    pub fn is_claimed(&self, guard: &'g Guard) -> bool {
        self.node.next.load(Ordering::Acquire, guard).tag() == CLAIMED
    }
}

impl Deref for NodeRef<'_> {
    type Target = OrderRecord;

    fn deref(&self) -> &OrderRecord {
        &self.node.order
    }
}

/// Lock-free order list with epoch-based reclamation
#[derive(Debug)]
pub struct ConcurrentOrderList {
    head: Atomic<OrderNode>,
}

impl ConcurrentOrderList {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    /// Push an order to the head of the list.
    ///
    /// The order is visible to every other thread from the moment the head CAS
    /// succeeds. The returned reference lives as long as `guard`.
    pub fn insert<'g>(&self, order: OrderRecord, guard: &'g Guard) -> NodeRef<'g> {
        let mut node = Owned::new(OrderNode {
            order,
            next: Atomic::null(),
        });
        let mut retries = 0u64;

        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            node.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, guard)
            {
                Ok(ptr) => {
                    if retries > 0 {
                        counter!("engine_cas_retries_total", "op" => "insert").increment(retries);
                    }
                    // SAFETY: just published under `guard`, so not yet reclaimable.
                    let node = unsafe { ptr.deref() };
                    return NodeRef { ptr, node };
                }
                Err(err) => {
                    trace!("insert lost head CAS, retrying");
                    node = err.new;
                    retries += 1;
                }
            }
        }
    }

    /// Remove a specific node. Returns `true` for exactly one caller per node;
    /// every other caller, and any caller passing a node that is not in this
    /// list, gets `false`.
    pub fn remove<'g>(&self, target: NodeRef<'g>, guard: &'g Guard) -> bool {
        if !self.contains(target, guard) {
            trace!(order_id = %target.id, "remove miss: node not in list");
            return false;
        }

        let mut next = target.node.next.load(Ordering::Acquire, guard);
        loop {
            if next.tag() == CLAIMED {
                trace!(order_id = %target.id, "remove miss: already claimed");
                return false;
            }
            match target.node.next.compare_exchange(
                next,
                next.with_tag(CLAIMED),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => break,
                // A neighbour was snipped or the node was claimed; re-check.
                Err(err) => next = err.current,
            }
        }

        self.unlink(target, guard);
        true
    }

    /// Snip `target` (already claimed) out of the chain, helping to unlink any
    /// other claimed nodes met on the way.
    fn unlink<'g>(&self, target: NodeRef<'g>, guard: &'g Guard) {
        let mut retries = 0u64;

        'retry: loop {
            let mut pred = &self.head;
            let mut curr = pred.load(Ordering::Acquire, guard);

            loop {
                // SAFETY: reached from the head while pinned.
                let Some(node) = (unsafe { curr.as_ref() }) else {
                    // Someone else finished the unlink.
                    break 'retry;
                };
                let succ = node.next.load(Ordering::Acquire, guard);

                if succ.tag() == CLAIMED {
                    let succ = succ.with_tag(0);
                    match pred.compare_exchange(
                        curr,
                        succ,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => {
                            // SAFETY: unreachable from the list now, and only the
                            // thread whose snip succeeded gets here for this node.
                            unsafe { guard.defer_destroy(curr) };
                            if target.same_node(curr) {
                                break 'retry;
                            }
                            curr = succ;
                        }
                        // `pred` changed or its owner was claimed under us.
                        Err(_) => {
                            retries += 1;
                            continue 'retry;
                        }
                    }
                } else {
                    pred = &node.next;
                    curr = succ;
                }
            }
        }

        if retries > 0 {
            counter!("engine_cas_retries_total", "op" => "remove").increment(retries);
        }
    }

    /// Whether `target` is still linked into this list
    pub fn contains<'g>(&self, target: NodeRef<'g>, guard: &'g Guard) -> bool {
        let mut curr = self.head.load(Ordering::Acquire, guard);
        // SAFETY: reached from the head while pinned.
        while let Some(node) = unsafe { curr.as_ref() } {
            if target.same_node(curr) {
                return true;
            }
            curr = node.next.load(Ordering::Acquire, guard).with_tag(0);
        }
        false
    }

    /// Walk the unclaimed nodes from the current head.
    ///
    /// The successor of each yielded node is read before the node is handed
    /// out, so removing the yielded node does not disturb the walk.
    pub fn iter<'g>(&self, guard: &'g Guard) -> Iter<'g> {
        Iter {
            curr: self.head.load(Ordering::Acquire, guard),
            guard,
        }
    }

    /// Point-in-time number of unclaimed orders
    pub fn len(&self) -> usize {
        let guard = &epoch::pin();
        self.iter(guard).count()
    }

    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        self.iter(guard).next().is_none()
    }

    /// Copies of the resting orders, in traversal order
    pub fn snapshot(&self) -> Vec<OrderSnapshot> {
        let guard = &epoch::pin();
        self.iter(guard).map(|node| node.snapshot()).collect()
    }
}

impl Default for ConcurrentOrderList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConcurrentOrderList {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the list. Nodes
        // already snipped were handed to the collector and are not linked here.
        unsafe {
            let guard = epoch::unprotected();
            let mut curr = self.head.load(Ordering::Relaxed, guard).with_tag(0);
            while let Some(node) = curr.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard).with_tag(0);
                drop(curr.into_owned());
                curr = next;
            }
        }
    }
}

pub struct Iter<'g> {
    curr: Shared<'g, OrderNode>,
    guard: &'g Guard,
}

impl<'g> Iterator for Iter<'g> {
    type Item = NodeRef<'g>;

    fn next(&mut self) -> Option<NodeRef<'g>> {
        loop {
            let ptr = self.curr.with_tag(0);
            // SAFETY: reached from the head while pinned.
            let node = unsafe { ptr.as_ref() }?;
            let succ = node.next.load(Ordering::Acquire, self.guard);
            self.curr = succ.with_tag(0);

            if succ.tag() != CLAIMED {
                return Some(NodeRef { ptr, node });
            }
        }
    }
}
