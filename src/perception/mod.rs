pub mod confirmation;
pub mod coords;
pub mod environment;
pub mod pipeline;
pub mod screenshot;
pub mod selector;
pub mod traits;
pub mod types;
pub mod yolo_detector;
