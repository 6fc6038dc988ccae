use std::{
    collections::HashSet,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use uuid::Uuid;

pub mod balance;
pub mod broadcast;

/// Marks a periodic cycle as running for as long as it is held.
pub(crate) struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    /// `None` when a cycle already holds the flag.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Holds an operation id for the duration of one API call.
pub(crate) struct OperationReservation<'a> {
    held: &'a Mutex<HashSet<Uuid>>,
    operation_id: Uuid,
}

impl<'a> OperationReservation<'a> {
    /// `None` when another call holds `operation_id`.
    pub(crate) fn try_reserve(held: &'a Mutex<HashSet<Uuid>>, operation_id: Uuid) -> Option<Self> {
        let inserted = held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation_id);
        inserted.then_some(Self { held, operation_id })
    }
}

impl Drop for OperationReservation<'_> {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.operation_id);
    }
}
