//! Removal hooks: per-key and per-value callbacks run once for every entry
//! that physically leaves a `HashIndex`.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Callback receiving a key or value that is being destroyed.
pub type RemovalHook<T> = Box<dyn FnMut(T)>;

pub(crate) struct RemovalHooks<K, V> {
    key_hook: Option<RemovalHook<K>>,
    value_hook: Option<RemovalHook<V>>,
    is_enabled: bool,
}

impl<K, V> RemovalHooks<K, V> {
    pub(crate) fn new(key_hook: Option<RemovalHook<K>>, value_hook: Option<RemovalHook<V>>) -> Self {
        Self {
            key_hook,
            value_hook,
            is_enabled: true,
        }
    }

    pub(crate) fn none() -> Self {
        Self::new(None, None)
    }

    /// Whether `notify` would invoke anything.
    pub(crate) fn is_active(&self) -> bool {
        self.is_enabled && (self.key_hook.is_some() || self.value_hook.is_some())
    }

    /// Hands `key` and `value` to their hooks. Without a hook the item is
    /// dropped normally.
    ///
    /// A hook that panics disables both hooks for the rest of the owner's
    /// life. The structure must already be consistent when this is called.
    pub(crate) fn notify(&mut self, key: K, value: V) {
        if !self.is_enabled {
            return;
        }

        let key_hook = &mut self.key_hook;
        let value_hook = &mut self.value_hook;
        let result = catch_unwind(AssertUnwindSafe(move || {
            if let Some(hook) = key_hook.as_mut() {
                hook(key);
            }
            if let Some(hook) = value_hook.as_mut() {
                hook(value);
            }
        }));

        if let Err(_payload) = result {
            self.is_enabled = false;
            #[cfg(feature = "logging")]
            log_panic(&*_payload);
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static)) {
    let message: Option<std::borrow::Cow<'_, str>> = (payload
        .downcast_ref::<&str>()
        .map(|s| (*s).into()))
    .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    if let Some(m) = message {
        log::error!("Disabled the removal hooks of a hash index because one panicked at '{m}'");
    } else {
        log::error!("Disabled the removal hooks of a hash index because one panicked");
    }
}
