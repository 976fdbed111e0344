//! Wire protocol between the retailer and its consumers
//!
//! Each message travels as one frame: a 4-byte big-endian length followed by
//! the bincode encoding of the message.
//!
//! ```text
//! retailer                      consumer
//!    │ ── PriceSignal ──────────────▶ │
//!    │ ◀──────────── ConsumptionReport│   (repeated once per round)
//!    │ ── PriceSignal{terminated} ──▶ │   (no reply, connection closes)
//! ```

use crate::error::{GridError, ProtocolError, Result};
use crate::types::consumption::ConsumptionReport;
use crate::types::price::{PriceBounds, PriceSchedule};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame payload (64 KiB)
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Retailer → consumer price broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSignal {
    pub prices: Vec<f32>,
    /// Set on the final signal; the consumer must not reply to it
    pub terminated: bool,
}

impl PriceSignal {
    pub fn candidate(schedule: &PriceSchedule) -> Self {
        Self {
            prices: schedule.prices().to_vec(),
            terminated: false,
        }
    }

    pub fn terminal(schedule: &PriceSchedule) -> Self {
        Self {
            prices: schedule.prices().to_vec(),
            terminated: true,
        }
    }

    /// Validate the carried prices against the expected shape
    pub fn to_schedule(&self, slots: usize, bounds: &PriceBounds) -> Result<PriceSchedule> {
        let schedule = PriceSchedule::new(self.prices.clone(), bounds)?;
        schedule.validate(slots, bounds)?;
        Ok(schedule)
    }
}

/// Consumer → retailer reply; same shape as the domain report
pub type ReportMessage = ConsumptionReport;

/// Length-prefixed bincode framing over any async byte stream
pub struct FramedConnection<S> {
    stream: S,
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Encode and write one message
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let payload = bincode::serialize(message)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                limit: MAX_FRAME_LEN,
            }
            .into());
        }

        self.stream.write_u32(payload.len() as u32).await?;
        self.stream.write_all(&payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read and decode one message; EOF at a frame boundary maps to
    /// `ConnectionError::Closed`
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        let len = self.stream.read_u32().await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                limit: MAX_FRAME_LEN,
            }
            .into());
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        bincode::deserialize(&payload).map_err(GridError::from)
    }

    /// Flush and shut down the write half
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;

    #[tokio::test]
    async fn test_price_signal_over_duplex() {
        let (a, b) = tokio::io::duplex(1024);
        let mut retailer = FramedConnection::new(a);
        let mut consumer = FramedConnection::new(b);

        let schedule = PriceSchedule::new(vec![0.8, 1.0, 1.2, 0.6], &PriceBounds::default()).unwrap();
        retailer.send(&PriceSignal::candidate(&schedule)).await.unwrap();

        let received: PriceSignal = consumer.recv().await.unwrap();
        assert!(!received.terminated);
        let parsed = received.to_schedule(4, &PriceBounds::default()).unwrap();
        assert_eq!(parsed, schedule);

        consumer
            .send(&ConsumptionReport::new(1, vec![3, 4, 5, 2]))
            .await
            .unwrap();
        let report: ReportMessage = retailer.recv().await.unwrap();
        assert_eq!(report.consumer_id, 1);
        assert_eq!(report.values, vec![3, 4, 5, 2]);
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut conn = FramedConnection::new(b);
        let err = conn.recv::<PriceSignal>().await.unwrap_err();
        assert!(matches!(err, GridError::Connection(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();
        let mut conn = FramedConnection::new(b);
        let err = conn.recv::<PriceSignal>().await.unwrap_err();
        assert!(matches!(
            err,
            GridError::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_signal_out_of_bounds_rejected() {
        let signal = PriceSignal {
            prices: vec![0.8, 3.0],
            terminated: false,
        };
        assert!(signal.to_schedule(2, &PriceBounds::default()).is_err());
    }
}
