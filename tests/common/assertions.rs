//! Custom assertion macros and utilities
//!
//! Provides enhanced assertion macros for better test output and
//! more descriptive error messages.

/// Assert that a result is ok and return the value
///
/// This macro unwraps a Result, providing a better error message
/// if the result is an error.
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert the sync state of a stored entity
#[macro_export]
macro_rules! assert_sync_state {
    ($store:expr, $entity_type:expr, $id:expr, $state:expr) => {
        match $store.get($entity_type, $id) {
            Some(entity) => assert_eq!(
                entity.sync_state, $state,
                "{} '{}' has sync state {:?}",
                $entity_type, $id, entity.sync_state
            ),
            None => panic!("{} '{}' is not in the store", $entity_type, $id),
        }
    };
}
