pub mod logging;
pub mod radio;
