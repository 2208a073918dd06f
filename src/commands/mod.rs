pub mod extract;
pub mod matching;
pub mod pipeline;
pub mod review;
pub mod routing;
pub mod status;
pub mod upload;
