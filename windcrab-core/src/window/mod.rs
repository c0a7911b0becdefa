//! Window shapes, assignment and aggregation contracts.

use std::marker::PhantomData;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::WindowError;
use crate::types::{EventTime, StreamData};

mod assigners;
mod functions;
mod primitives;
mod session;

pub use assigners::*;
pub use functions::*;
pub use primitives::*;
pub use session::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
