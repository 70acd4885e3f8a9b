use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use dtf_core::{
    config::ExecutorConfig, models::SubtaskData, ExecutorInvoker, SchedulerError,
    SchedulerResult,
};

#[derive(Serialize)]
struct PushSubtasksRequest<'a> {
    subtasks: &'a [SubtaskData],
}

/// 通过 HTTP 将子任务批量推送给执行器服务
pub struct HttpExecutorInvoker {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpExecutorInvoker {
    pub fn new(config: &ExecutorConfig) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl ExecutorInvoker for HttpExecutorInvoker {
    async fn invoke(&self, subtasks: &[SubtaskData]) -> SchedulerResult<()> {
        let request = PushSubtasksRequest { subtasks };

        match self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    debug!("推送 {} 个子任务到执行器成功", subtasks.len());
                    Ok(())
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!("推送子任务到执行器失败: HTTP {} - {}", status, body);
                    Err(SchedulerError::ExecutorPush(format!(
                        "HTTP {status} - {body}"
                    )))
                }
            }
            Err(e) => {
                warn!("连接执行器失败: {}", e);
                Err(SchedulerError::ExecutorPush(format!("连接执行器失败: {e}")))
            }
        }
    }
}
