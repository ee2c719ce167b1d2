pub mod catalog;
pub mod selector;
