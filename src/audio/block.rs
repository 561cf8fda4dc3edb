// SampleBlock - the fixed-size interleaved buffer exchanged with the ports
//
// Allocated once when the driver is constructed and then owned by the loop
// thread. The boxed slice cannot grow or shrink, so the block size is fixed
// for the life of the driver and the steady-state loop never allocates.

use crate::config::DriverConfig;

#[derive(Debug)]
pub struct SampleBlock {
    samples: Box<[i16]>,
}

impl SampleBlock {
    /// Allocate a zeroed block of frames x output channels samples
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            samples: vec![0_i16; config.block_samples()].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.samples
    }
}
