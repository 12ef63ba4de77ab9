pub mod assignments;
pub mod catalog;
pub mod categories;
pub mod classes;
pub mod core;
pub mod enrollments;
pub mod settings;
pub mod submissions;
pub mod users;
