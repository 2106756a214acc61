pub mod report;
pub mod terminal;
