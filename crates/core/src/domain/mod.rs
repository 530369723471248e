pub mod intent;
pub mod money;
pub mod preview;
