pub mod call;
pub mod directory;
pub mod operation;
pub mod state;
