mod categories;
mod ingredients;
mod ratings;
mod recipes;
mod tags;
mod users;

pub use categories::*;
pub use ingredients::*;
pub use ratings::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
