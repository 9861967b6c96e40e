use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, Serialize)]
pub struct MetricsData {
    pub chat_requests: u64,
    pub chat_replies: u64,
    pub chat_failures: u64,
    pub off_topic_redirects: u64,
    pub analyses_completed: u64,
    pub analyses_failed: u64,
    pub keyword_usage: HashMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    ChatRequest,
    ChatReply,
    ChatFailure,
    OffTopicRedirect,
    AnalysisCompleted,
    AnalysisFailed,
}

#[derive(Debug, Clone)]
pub struct MetricsManager {
    inner: Arc<RwLock<MetricsData>>,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsManager {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsData::default())),
        }
    }

    pub async fn record(&self, event: MetricEvent) {
        let mut data = self.inner.write().await;
        let counter = match event {
            MetricEvent::ChatRequest => &mut data.chat_requests,
            MetricEvent::ChatReply => &mut data.chat_replies,
            MetricEvent::ChatFailure => &mut data.chat_failures,
            MetricEvent::OffTopicRedirect => &mut data.off_topic_redirects,
            MetricEvent::AnalysisCompleted => &mut data.analyses_completed,
            MetricEvent::AnalysisFailed => &mut data.analyses_failed,
        };
        *counter += 1;
    }

    pub async fn increment_keywords(&self, keywords: &[&str]) {
        if keywords.is_empty() {
            return;
        }
        let mut data = self.inner.write().await;
        for keyword in keywords {
            *data.keyword_usage.entry(keyword.to_string()).or_insert(0) += 1;
        }
    }

    pub async fn get_metrics(&self) -> MetricsData {
        self.inner.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn hold_write(&self) -> tokio::sync::RwLockWriteGuard<'_, MetricsData> {
        self.inner.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_accumulate() {
        let metrics = MetricsManager::new();
        metrics.record(MetricEvent::ChatRequest).await;
        metrics.record(MetricEvent::ChatRequest).await;
        metrics.record(MetricEvent::AnalysisFailed).await;
        metrics.increment_keywords(&["mri", "scan"]).await;
        metrics.increment_keywords(&["mri"]).await;

        let data = metrics.get_metrics().await;
        assert_eq!(data.chat_requests, 2);
        assert_eq!(data.analyses_failed, 1);
        assert_eq!(data.keyword_usage.get("mri"), Some(&2));
        assert_eq!(data.keyword_usage.get("scan"), Some(&1));
    }
}
