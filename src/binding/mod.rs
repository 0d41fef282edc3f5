// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Callback bindings and the caller registrations that pin them.
//!
//! An application hands a callback object to the dispatcher, the name
//! service or a service group. The receiving component wraps it in a
//! [`CallbackBinding`], binds it to a [`Caller`] for as long as it may be
//! invoked, and optionally attaches adapter data the component needs to
//! route back to it.

mod caller;

pub use caller::{Caller, CallerId, CallerKind, CallerTable};

use serde::Serialize;
use std::fmt;

/// Key under which a service-group adapter is folded into group options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AdapterKey(pub u64);

impl fmt::Display for AdapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter#{}", self.0)
    }
}

/// A callback object plus the caller registration and adapter data that
/// belong to it.
///
/// The caller registration and the adapter are independent: either may be
/// present without the other. Each bind releases any previous registration
/// exactly once, and dropping the binding releases whatever is still held.
pub struct CallbackBinding<C: ?Sized, A = ()> {
    callback: Box<C>,
    caller: Option<Caller>,
    adapter: Option<A>,
}

impl<C: ?Sized, A> CallbackBinding<C, A> {
    pub fn new(callback: Box<C>) -> Self {
        Self {
            callback,
            caller: None,
            adapter: None,
        }
    }

    /// Bind to `caller`, releasing any registration already held.
    pub fn bind(&mut self, caller: Caller) {
        if let Some(previous) = self.caller.replace(caller) {
            previous.release();
        }
    }

    /// Release the current registration. Returns false if nothing was bound.
    pub fn unbind(&mut self) -> bool {
        match self.caller.take() {
            Some(caller) => {
                caller.release();
                true
            }
            None => false,
        }
    }

    /// Attach adapter data, returning any adapter it displaces.
    pub fn attach(&mut self, adapter: A) -> Option<A> {
        self.adapter.replace(adapter)
    }

    pub fn detach(&mut self) -> Option<A> {
        self.adapter.take()
    }

    /// Unbind and detach. Safe to call any number of times.
    pub fn close(&mut self) {
        self.unbind();
        self.adapter = None;
    }

    pub fn is_bound(&self) -> bool {
        self.caller.is_some()
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn adapter(&self) -> Option<&A> {
        self.adapter.as_ref()
    }

    pub fn callback(&self) -> &C {
        &*self.callback
    }

    pub fn callback_mut(&mut self) -> &mut C {
        &mut *self.callback
    }

    /// The callback and the adapter at once, for invoking a callback with
    /// its own adapter data as an argument.
    pub fn split_mut(&mut self) -> (&mut C, Option<&A>) {
        (&mut *self.callback, self.adapter.as_ref())
    }
}

impl<C, A> CallbackBinding<C, A> {
    pub fn from_callback(callback: C) -> Self {
        Self::new(Box::new(callback))
    }
}

impl<C: ?Sized, A: fmt::Debug> fmt::Debug for CallbackBinding<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackBinding")
            .field("caller", &self.caller)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    #[test]
    fn test_rebind_releases_previous_registration_once() {
        let table = CallerTable::new();
        let mut binding: CallbackBinding<Counter> = CallbackBinding::from_callback(Counter(0));

        binding.bind(table.register(CallerKind::Dispatcher));
        binding.bind(table.register(CallerKind::Dispatcher));

        assert_eq!(table.active(), 1);
        assert_eq!(table.released(), 1);
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let table = CallerTable::new();
        let mut binding: CallbackBinding<Counter> = CallbackBinding::from_callback(Counter(0));
        binding.bind(table.register(CallerKind::NameService));

        assert!(binding.unbind());
        assert!(!binding.unbind());
        assert_eq!(table.active(), 0);
        assert_eq!(table.released(), 1);
    }

    #[test]
    fn test_adapter_is_independent_of_caller() {
        let table = CallerTable::new();
        let mut binding: CallbackBinding<Counter, AdapterKey> =
            CallbackBinding::from_callback(Counter(0));

        assert!(binding.attach(AdapterKey(1)).is_none());
        assert!(!binding.is_bound());

        binding.bind(table.register(CallerKind::ServiceGroup));
        assert_eq!(binding.detach(), Some(AdapterKey(1)));
        assert!(binding.is_bound());
        assert!(binding.detach().is_none());
    }

    #[test]
    fn test_close_releases_everything_and_can_repeat() {
        let table = CallerTable::new();
        let mut binding: CallbackBinding<Counter, AdapterKey> =
            CallbackBinding::from_callback(Counter(0));
        binding.bind(table.register(CallerKind::ServiceGroup));
        binding.attach(AdapterKey(4));

        binding.close();
        binding.close();

        assert!(!binding.is_bound());
        assert!(binding.adapter().is_none());
        assert_eq!(table.released(), 1);
    }

    #[test]
    fn test_dropping_a_bound_binding_releases_its_caller() {
        let table = CallerTable::new();
        {
            let mut binding: CallbackBinding<Counter> = CallbackBinding::from_callback(Counter(0));
            binding.bind(table.register(CallerKind::Dispatcher));
            assert_eq!(table.active(), 1);
        }
        assert_eq!(table.active(), 0);
        assert_eq!(table.released(), 1);
    }

    #[test]
    fn test_split_mut_exposes_callback_and_adapter() {
        let mut binding: CallbackBinding<Counter, &'static str> =
            CallbackBinding::from_callback(Counter(0));
        binding.attach("ctx");

        let (callback, adapter) = binding.split_mut();
        callback.0 += 1;
        assert_eq!(adapter, Some(&"ctx"));
        assert_eq!(binding.callback().0, 1);
    }
}
