pub mod analysis;
pub mod draft;
