// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod countdown;
pub mod forms;
pub mod ids;
pub mod model;
pub mod state;
pub mod sync;
pub mod table;

pub use countdown::*;
pub use forms::*;
pub use ids::*;
pub use model::*;
pub use state::*;
pub use sync::*;
pub use table::*;
