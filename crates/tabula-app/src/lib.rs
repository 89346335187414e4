// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod forms;
pub mod ids;
pub mod model;
pub mod ordering;
pub mod predicate;
pub mod query;
pub mod search;
pub mod state;
pub mod window;

pub use forms::*;
pub use ids::*;
pub use model::*;
pub use ordering::*;
pub use predicate::*;
pub use query::*;
pub use search::*;
pub use state::*;
pub use window::*;
