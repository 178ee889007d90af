//! Type-state markers for the builder pattern
//!
//! These types track at compile time whether the app key has been set, so
//! `build()` only exists on a builder that has one.

use std::marker::PhantomData;

/// Marker trait for key state
pub trait KeyState {}

/// App key has not been set
pub struct NoKey;
impl KeyState for NoKey {}

/// App key has been set
pub struct HasKey;
impl KeyState for HasKey {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<K> {
    _key: PhantomData<K>,
}

impl<K> TypeState<K> {
    pub(crate) fn new() -> Self {
        Self { _key: PhantomData }
    }
}

impl<K> Default for TypeState<K> {
    fn default() -> Self {
        Self::new()
    }
}
