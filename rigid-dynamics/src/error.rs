// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Error types and contract checks
//!
//! The engine separates two kinds of failure:
//!
//! - **Contract violations** (negative scale, double attach, destroying a
//!   body that is still linked) are programming errors. They are checked by
//!   [`contract!`](crate::contract) in debug and test builds, and in release
//!   builds only when the `strict-contracts` feature is enabled.
//! - **API misuse through handles** (stale ids, removing something a model
//!   still references) is recoverable and reported as [`PhysicsError`].

use thiserror::Error;

/// Recoverable errors returned by the world and model registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhysicsError {
    /// The body handle is stale or was never issued by this world
    #[error("body {0} does not exist")]
    UnknownBody(String),

    /// The joint handle is stale or was never issued by this world
    #[error("joint {0} does not exist")]
    UnknownJoint(String),

    /// The object is still referenced by joints or models
    #[error("{what} is still in use ({count} reference(s))")]
    InUse {
        /// Human readable description of the object
        what: String,
        /// Number of outstanding references
        count: usize,
    },

    /// A joint was asked to connect a body to itself
    #[error("a joint cannot connect body {0} to itself")]
    SelfJoint(String),

    /// A model with the same name is already registered
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    /// No model with this name is registered
    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    /// The model was built against an incompatible model API
    #[error("model '{name}' API version {found} is incompatible with engine model API {expected}")]
    IncompatibleModel {
        /// Model name
        name: String,
        /// Version reported by the model
        found: String,
        /// Version implemented by the engine
        expected: String,
    },
}

/// Convenience alias used across the public API
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Check an engine contract
///
/// Expands to an `assert!` when debug assertions are on or when the
/// `strict-contracts` feature is enabled, and to nothing otherwise. The
/// condition is not evaluated in release builds without the feature, so it
/// must be free of side effects.
///
/// # Examples
///
/// ```
/// use rigid_dynamics::contract;
///
/// let scale = 2.0;
/// contract!(scale > 0.0, "Scale components must be positive");
/// ```
#[macro_export]
macro_rules! contract {
    ($cond:expr, $($msg:tt)+) => {
        if cfg!(any(debug_assertions, feature = "strict-contracts")) {
            assert!($cond, $($msg)+);
        }
    };
}
