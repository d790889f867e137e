// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash. Each handle has one owner that
// destroys it; shared parents are held through Arc.

pub mod commands;
pub mod depth;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::Surface;
pub use swapchain::Swapchain;
