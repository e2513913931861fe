//! Shutdown and wakeup causes, persisted to a flash queue.
//!
//! Recording happens inside the state machine ticks, so it only updates the
//! in-RAM summary and hands the record to the writer task. The queue is
//! replayed at boot to restore the summary.

use core::cell::RefCell;

use defmt::{debug, info, warn};
use ec_power::cause::CauseSummary;
use ec_power::{Cause, CauseLog, CauseRecord};
use embassy_executor::task;
use embassy_sync::blocking_mutex::{self, raw::CriticalSectionRawMutex};
use embassy_sync::channel;
use embassy_time::Instant;
use sequential_storage::cache::NoCache;
use sequential_storage::queue;

use crate::MFlashType;
use crate::config::MAX_CAUSE_LOG_QUEUE_DEPTH;
use crate::flash_layout::cause_log_range;
use crate::tasks::config_manager::ConfigError;

const RECORD_BUFFER_SIZE: usize = 32;

static SUMMARY: blocking_mutex::Mutex<CriticalSectionRawMutex, RefCell<CauseSummary>> =
    blocking_mutex::Mutex::new(RefCell::new(CauseSummary::new()));

pub fn summary() -> CauseSummary {
    SUMMARY.lock(|s| *s.borrow())
}

pub type CauseLogChannelType =
    channel::Channel<CriticalSectionRawMutex, CauseRecord, MAX_CAUSE_LOG_QUEUE_DEPTH>;
pub static CAUSE_LOG_CHANNEL: CauseLogChannelType = channel::Channel::new();

/// Handle given to both state machines.
#[derive(Clone, Copy, Default)]
pub struct FlashCauseLog;

impl CauseLog for FlashCauseLog {
    fn record(&mut self, cause: Cause) {
        info!("Cause {:?}, code {=u32:#x}", cause, cause.code());
        SUMMARY.lock(|s| s.borrow_mut().apply(cause));
        let record = CauseRecord {
            uptime_ms: Instant::now().as_millis(),
            cause,
        };
        if CAUSE_LOG_CHANNEL.try_send(record).is_err() {
            warn!("Cause log queue full, {:?} not persisted", cause);
        }
    }
}

async fn append(flash: &MFlashType<'static>, record: &CauseRecord) -> Result<(), ConfigError> {
    let mut buf = [0u8; RECORD_BUFFER_SIZE];
    let bytes = postcard::to_slice(record, &mut buf)?;
    let mut flash = flash.lock().await;
    // oldest records go first when the range is full
    queue::push(&mut *flash, cause_log_range(), &mut NoCache::new(), bytes, true).await?;
    Ok(())
}

async fn replay(flash: &MFlashType<'static>) -> Result<CauseSummary, ConfigError> {
    let mut flash = flash.lock().await;
    let mut cache = NoCache::new();
    let mut iter = queue::iter(&mut *flash, cause_log_range(), &mut cache).await?;
    let mut buf = [0u8; RECORD_BUFFER_SIZE];
    let mut summary = CauseSummary::new();
    let mut count = 0u32;
    while let Some(entry) = iter.next(&mut buf).await? {
        match postcard::from_bytes::<CauseRecord>(&entry) {
            Ok(record) => {
                summary.apply(record.cause);
                count += 1;
            }
            Err(_) => warn!("Skipping undecodable cause record"),
        }
    }
    debug!("Replayed {} cause records", count);
    Ok(summary)
}

/// Restore the summary from flash. Must run before the power tasks start.
pub async fn init_cause_log(flash: &'static MFlashType<'static>) {
    match replay(flash).await {
        Ok(restored) => {
            info!("Restored causes: {:?}", restored);
            SUMMARY.lock(|s| *s.borrow_mut() = restored);
        }
        Err(e) => warn!("Cause log unreadable, starting empty: {:?}", e),
    }
}

#[task]
pub async fn cause_log_task(flash: &'static MFlashType<'static>) {
    info!("Starting cause log task");

    let receiver = CAUSE_LOG_CHANNEL.receiver();

    info!("Cause log task initialized");

    loop {
        let record = receiver.receive().await;
        if let Err(e) = append(flash, &record).await {
            warn!("Failed to persist {:?}: {:?}", record.cause, e);
        }
    }
}
