use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};

use sluice_api::error::SourceError;
use sluice_api::record::{PartitionId, SourceMessage};
use sluice_api::source::{PartitionStream, RecordSource, StartPosition};

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Kafka implementation of the source seam.
///
/// One dedicated consumer per partition with manual assignment. Offsets
/// live in the engine's checkpoint store — consumer-group commits are
/// disabled so Kafka never tracks position on our behalf.
pub struct KafkaSource {
    brokers: String,
    topic: String,
    group_id: String,
    poll_timeout: Duration,
}

impl KafkaSource {
    pub fn new(
        brokers: impl Into<String>,
        topic: impl Into<String>,
        poll_timeout: Duration,
    ) -> Self {
        let brokers = brokers.into();
        let topic = topic.into();
        // Unique group per topic; we don't want to join a shared consumer
        // group, the id is only required by the client.
        let group_id = format!("sluice-{topic}");
        Self {
            brokers,
            topic,
            group_id,
            poll_timeout,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers);
        cfg.set("session.timeout.ms", "6000");
        cfg.set("enable.auto.commit", "false");
        cfg.set("group.id", &self.group_id);
        // A checkpoint that aged past retention resumes at the earliest
        // available offset instead of failing the partition; the broker
        // logs the reset and so do we via the consumer error path.
        cfg.set("auto.offset.reset", "smallest");
        cfg
    }
}

impl RecordSource for KafkaSource {
    fn partitions(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, SourceError>> + Send + '_>> {
        let cfg = self.client_config();
        let topic = self.topic.clone();
        Box::pin(async move {
            let probe: BaseConsumer = cfg
                .create()
                .map_err(|e| SourceError::Connect(e.to_string()))?;

            // fetch_metadata blocks inside librdkafka.
            let metadata = {
                let topic = topic.clone();
                tokio::task::spawn_blocking(move || {
                    probe.fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                })
                .await
                .map_err(|e| SourceError::Metadata(e.to_string()))?
                .map_err(|e| SourceError::Metadata(e.to_string()))?
            };

            let topic_metadata = metadata
                .topics()
                .first()
                .ok_or_else(|| SourceError::Metadata(format!("topic '{topic}' not in metadata")))?;

            let mut partitions: Vec<PartitionId> = topic_metadata
                .partitions()
                .iter()
                .map(|p| p.id())
                .collect();
            partitions.sort_unstable();
            Ok(partitions)
        })
    }

    fn open(
        &self,
        partition: PartitionId,
        start: StartPosition,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, SourceError>> + Send + '_>>
    {
        let cfg = self.client_config();
        let topic = self.topic.clone();
        let poll_timeout = self.poll_timeout;
        Box::pin(async move {
            let consumer: StreamConsumer = cfg
                .create()
                .map_err(|e| SourceError::Connect(e.to_string()))?;

            let mut assignment = TopicPartitionList::new();
            assignment.add_partition(&topic, partition);
            assignment
                .set_partition_offset(&topic, partition, start_offset(start))
                .map_err(|e| SourceError::Fetch {
                    partition,
                    message: e.to_string(),
                })?;
            consumer
                .assign(&assignment)
                .map_err(|e| SourceError::Connect(e.to_string()))?;

            Ok(Box::new(KafkaPartitionStream {
                consumer,
                partition,
                poll_timeout,
            }) as Box<dyn PartitionStream>)
        })
    }
}

fn start_offset(start: StartPosition) -> Offset {
    match start {
        StartPosition::Earliest => Offset::Beginning,
        StartPosition::Latest => Offset::End,
        StartPosition::Offset(o) => Offset::Offset(o),
    }
}

pub struct KafkaPartitionStream {
    consumer: StreamConsumer,
    partition: PartitionId,
    poll_timeout: Duration,
}

impl PartitionStream for KafkaPartitionStream {
    fn fetch(
        &mut self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceMessage>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + self.poll_timeout;
            let mut messages = Vec::new();

            while messages.len() < max {
                match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                    // Poll window elapsed — return what we have.
                    Err(_) => break,
                    Ok(Err(e)) => {
                        if messages.is_empty() {
                            return Err(SourceError::Fetch {
                                partition: self.partition,
                                message: e.to_string(),
                            });
                        }
                        tracing::warn!(
                            partition = self.partition,
                            error = %e,
                            "consumer error mid-batch, returning partial pull"
                        );
                        break;
                    }
                    Ok(Ok(message)) => {
                        messages.push(SourceMessage {
                            partition: message.partition(),
                            offset: message.offset(),
                            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        });
                    }
                }
            }

            Ok(messages)
        })
    }
}
