pub mod alert;
pub mod enums;
pub mod settings;

pub use alert::*;
pub use enums::*;
pub use settings::*;
