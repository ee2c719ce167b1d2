pub mod disk_guard;
pub mod segment_writer;
