pub mod customer;
pub mod group;
pub mod reminder;
