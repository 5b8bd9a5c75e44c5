pub mod mapper;
pub mod smoother;
pub mod spring;

pub use mapper::{screen_to_world, to_ndc, Ray, Viewport};
pub use smoother::KeypointSmoother;
pub use spring::{Spring2, SpringParams};
