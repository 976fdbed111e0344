//! Consumer side of the negotiation
//!
//! Answers every non-terminal price signal with exactly one consumption
//! report and stops at the terminal signal without replying.

use gridtou_common::{
    ConnectionError, ConsumerProfile, FramedConnection, GridError, PriceBounds, PriceSchedule,
    PriceSignal, ResponseModel, Result, SatisfactionModel,
};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// What one consumer saw over a whole negotiation
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerRunSummary {
    pub consumer_id: i32,
    /// Reports sent, one per non-terminal price
    pub rounds: u64,
    /// Price carried by the terminal signal
    pub final_price: PriceSchedule,
}

/// One simulated household connected to the retailer
pub struct ConsumerClient<M = SatisfactionModel> {
    profile: ConsumerProfile,
    model: M,
    slots: usize,
    bounds: PriceBounds,
}

impl ConsumerClient<SatisfactionModel> {
    pub fn new(profile: ConsumerProfile, slots: usize, bounds: PriceBounds) -> Self {
        Self::with_model(profile, SatisfactionModel::default(), slots, bounds)
    }
}

impl<M: ResponseModel> ConsumerClient<M> {
    pub fn with_model(profile: ConsumerProfile, model: M, slots: usize, bounds: PriceBounds) -> Self {
        Self {
            profile,
            model,
            slots,
            bounds,
        }
    }

    pub fn consumer_id(&self) -> i32 {
        self.profile.consumer_id
    }

    /// Connect to `addr` and take part in one negotiation
    pub async fn run(
        &self,
        addr: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<ConsumerRunSummary> {
        let stream = connect_with_retry(addr, attempts, retry_delay).await?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "Failed to set TCP_NODELAY");
        }
        self.run_on(stream).await
    }

    /// Take part in one negotiation over an established stream
    #[instrument(skip(self, stream), fields(consumer = self.profile.consumer_id))]
    pub async fn run_on<S>(&self, stream: S) -> Result<ConsumerRunSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = FramedConnection::new(stream);
        let mut rounds = 0u64;

        loop {
            let signal: PriceSignal = conn.recv().await?;
            let schedule = signal.to_schedule(self.slots, &self.bounds)?;

            if signal.terminated {
                info!(rounds, price = %schedule, "Received terminal price");
                if let Err(err) = conn.close().await {
                    debug!(error = %err, "Close after terminal price failed");
                }
                return Ok(ConsumerRunSummary {
                    consumer_id: self.profile.consumer_id,
                    rounds,
                    final_price: schedule,
                });
            }

            let report = self.model.respond(&self.profile, &schedule);
            debug!(price = %schedule, values = ?report.values, "Responding to price");
            conn.send(&report).await?;
            rounds += 1;
        }
    }
}

/// Open a TCP connection, retrying while the retailer is not up yet
pub async fn connect_with_retry(
    addr: &str,
    attempts: u32,
    retry_delay: Duration,
) -> Result<TcpStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < attempts => {
                warn!(addr, attempt, error = %err, "Retailer not reachable, retrying");
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => return Err(GridError::Connection(ConnectionError::Io(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridtou_common::protocol::ReportMessage;

    fn schedule(prices: Vec<f32>) -> PriceSchedule {
        PriceSchedule::new(prices, &PriceBounds::default()).unwrap()
    }

    fn client(consumer: usize) -> ConsumerClient {
        ConsumerClient::new(
            ConsumerProfile::reference_profiles().remove(consumer),
            4,
            PriceBounds::default(),
        )
    }

    #[tokio::test]
    async fn test_replies_once_per_price_then_stops() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let consumer = tokio::spawn(async move { client(0).run_on(theirs).await });
        let mut retailer = FramedConnection::new(ours);

        let flat = schedule(vec![1.0; 4]);
        retailer.send(&PriceSignal::candidate(&flat)).await.unwrap();
        let report: ReportMessage = retailer.recv().await.unwrap();
        assert_eq!(report.consumer_id, 0);
        assert_eq!(report.values, vec![3, 5, 6, 6]);

        let final_price = schedule(vec![0.8, 1.0, 1.2, 0.6]);
        retailer
            .send(&PriceSignal::terminal(&final_price))
            .await
            .unwrap();

        let summary = consumer.await.unwrap().unwrap();
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.final_price, final_price);

        // no report follows the terminal price
        let after = retailer.recv::<ReportMessage>().await.unwrap_err();
        assert!(after.is_connection());
    }

    #[tokio::test]
    async fn test_out_of_bounds_price_is_rejected() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let consumer = tokio::spawn(async move { client(1).run_on(theirs).await });
        let mut retailer = FramedConnection::new(ours);

        retailer
            .send(&PriceSignal {
                prices: vec![0.8, 9.0, 1.0, 1.0],
                terminated: false,
            })
            .await
            .unwrap();

        let err = consumer.await.unwrap().unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retailer_hangup_is_connection_error() {
        let (ours, theirs) = tokio::io::duplex(4096);
        drop(ours);
        let err = client(0).run_on(theirs).await.unwrap_err();
        assert!(matches!(err, GridError::Connection(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_attempts() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connect_with_retry(&addr, 2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }
}
