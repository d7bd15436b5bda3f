pub mod etl;
pub mod lookup;
pub mod pipeline;
pub mod reverse;
pub mod worker;

pub use crate::domain::model::{InputSheet, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
