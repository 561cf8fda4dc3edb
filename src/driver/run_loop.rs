//! Body of the audio loop thread
//!
//! One iteration: read capture (if any) into the block, let the engine
//! process it in place, write it to render. Nothing here allocates once the
//! ports are open. The ports are opened and released on this thread.

use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use super::events::DriverEvent;
use super::state::{DriverOutcome, DriverStatus};
use crate::audio::block::SampleBlock;
use crate::audio::negotiate::{open_ports, OpenedPorts};
use crate::audio::port::AudioPlatform;
use crate::audio::priority::{elevate_current_thread, PriorityResult};
use crate::config::DriverConfig;
use crate::engine::{EngineHandle, STATUS_OK};
use crate::error::log_audio_error;

/// Everything the loop thread shares with the controller
pub(crate) struct LoopContext {
    pub config: DriverConfig,
    pub engine: Arc<dyn EngineHandle>,
    pub status: Arc<DriverStatus>,
    pub events: broadcast::Sender<DriverEvent>,
}

impl LoopContext {
    fn emit(&self, event: DriverEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Publishes Ended if the loop unwinds, after the ports have been dropped
struct EndGuard {
    status: Arc<DriverStatus>,
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("[AudioLoop] Loop thread panicked, marking driver ended");
            self.status.finish(DriverOutcome::Panicked);
        }
    }
}

pub(crate) fn run(ctx: LoopContext, mut platform: Box<dyn AudioPlatform>, mut block: SampleBlock) {
    let _guard = EndGuard {
        status: Arc::clone(&ctx.status),
    };
    let span = tracing::info_span!(
        "audio_loop",
        sample_rate = ctx.config.sample_rate,
        block_frames = ctx.config.block_frames
    );
    let _entered = span.enter();

    info!("[AudioLoop] Audio thread starting");

    if ctx.config.realtime_priority {
        match elevate_current_thread() {
            PriorityResult::Elevated => info!("[AudioLoop] Thread priority set to urgent audio"),
            PriorityResult::Denied { reason } => {
                warn!("[AudioLoop] Could not raise thread priority: {}", reason)
            }
            PriorityResult::Unsupported => {
                debug!("[AudioLoop] Thread priority elevation unsupported on this platform")
            }
        }
    }

    let mut ports = match open_ports(platform.as_mut(), &ctx.config) {
        Ok(ports) => ports,
        Err(err) => {
            log_audio_error(&err, "audio_loop(open_ports)");
            ctx.status.finish(DriverOutcome::FailedToStart);
            ctx.emit(DriverEvent::FailedToStart {
                reason: err.to_string(),
            });
            return;
        }
    };

    let duplex = ports.is_duplex();
    ctx.status.set_duplex(duplex);

    if ctx.status.enter_running() {
        ctx.emit(DriverEvent::Started {
            duplex,
            capacity_bytes: ports.plan.capacity_bytes,
        });
        if duplex {
            info!("[AudioLoop] Entering main loop (input and output)");
        } else {
            info!("[AudioLoop] Entering main loop (output only)");
        }
        steady_state(&ctx, &mut ports, block.as_mut_slice());
    } else {
        info!("[AudioLoop] Stop requested before loop entry");
    }

    info!("[AudioLoop] Audio thread stopping");
    ports.close();

    let outcome = ctx.status.finish(DriverOutcome::Stopped);
    info!(
        "[AudioLoop] Ended: {:?} after {} blocks",
        outcome,
        ctx.status.blocks_processed()
    );
    ctx.emit(DriverEvent::Ended {
        outcome,
        blocks: ctx.status.blocks_processed(),
        short_reads: ctx.status.short_reads(),
    });
}

fn steady_state(ctx: &LoopContext, ports: &mut OpenedPorts, block: &mut [i16]) {
    while ctx.status.is_running() {
        let code = match ports.capture.as_mut() {
            Some(capture) => {
                match capture.read(block) {
                    Ok(read) if read < block.len() => {
                        let total = ctx.status.note_short_read();
                        debug!(
                            "[AudioLoop] Short capture read: {}/{} samples ({} total)",
                            read,
                            block.len(),
                            total
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        ctx.status.note_short_read();
                        log_audio_error(&err, "audio_loop(capture read)");
                    }
                }
                ctx.engine.process_duplex(block)
            }
            None => ctx.engine.process_render_only(block),
        };

        if code != STATUS_OK {
            warn!("[AudioLoop] Engine returned status {}, stopping", code);
            ctx.status
                .halt(DriverOutcome::EngineHalted { status: code });
            ctx.emit(DriverEvent::EngineHalted { status: code });
        }

        // The block from a halting call is still written
        if let Err(err) = ports.render.write(block) {
            log_audio_error(&err, "audio_loop(render write)");
            ctx.status.halt(DriverOutcome::RenderFailed);
            break;
        }

        ctx.status.note_block();
    }
}
