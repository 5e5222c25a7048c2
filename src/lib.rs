pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::conditions;
pub use domain::entities;
pub use domain::time;
pub use domain::value_objects;
pub use application::scheduler;
pub use infrastructure::output;
