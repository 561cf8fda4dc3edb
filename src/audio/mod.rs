// Audio module - hardware ports, buffer negotiation and platform backends

pub mod block;
pub mod negotiate;
pub mod port;
pub mod priority;

#[cfg(not(target_os = "android"))]
pub mod cpal_backend;
#[cfg(target_os = "android")]
pub mod oboe_backend;

// Re-export commonly used types for convenience
pub use block::SampleBlock;
pub use negotiate::{open_ports, plan_buffers, BufferPlan, OpenedPorts};
pub use port::{
    AudioPlatform, CapturePort, PortState, RenderPort, StallCounter, StreamSpec,
    MAX_STALLED_WRITES,
};
pub use priority::{elevate_current_thread, PriorityResult, URGENT_AUDIO_NICE};

#[cfg(not(target_os = "android"))]
pub use cpal_backend::CpalPlatform;
#[cfg(target_os = "android")]
pub use oboe_backend::OboePlatform;

/// The hardware platform for the current target
pub fn default_platform() -> Box<dyn AudioPlatform> {
    #[cfg(target_os = "android")]
    {
        Box::new(OboePlatform::new())
    }
    #[cfg(not(target_os = "android"))]
    {
        Box::new(CpalPlatform::new())
    }
}
