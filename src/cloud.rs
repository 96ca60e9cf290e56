use aws_sdk_sagemaker::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("describe notebook instance '{name}' failed: {message}")]
    Describe { name: String, message: String },
    #[error("stop notebook instance '{name}' failed: {message}")]
    Stop { name: String, message: String },
    #[error("notebook instance '{name}' has no LastModifiedTime")]
    MissingLastModified { name: String },
    #[error("notebook instance '{name}' reported an out-of-range LastModifiedTime")]
    InvalidLastModified { name: String },
}

/// Management-API seam for the notebook instance. The production
/// implementation talks to SageMaker; tests substitute a mock.
#[allow(async_fn_in_trait)]
pub trait NotebookControl {
    /// Last-modified time of the instance resource, a proxy for recent
    /// administrative changes such as resizing.
    async fn last_modified(&self, name: &str) -> Result<DateTime<Utc>, CloudError>;

    /// Requests a stop of the instance. Not retried; failures abort the run.
    async fn stop(&self, name: &str) -> Result<(), CloudError>;
}

pub struct SageMakerControl {
    client: aws_sdk_sagemaker::Client,
}

impl SageMakerControl {
    /// Builds a client from the ambient AWS environment (instance role,
    /// region from IMDS or env), the same credential chain boto3 uses.
    pub async fn connect() -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_sagemaker::Client::new(&shared),
        }
    }
}

impl NotebookControl for SageMakerControl {
    async fn last_modified(&self, name: &str) -> Result<DateTime<Utc>, CloudError> {
        let described = self
            .client
            .describe_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|err| CloudError::Describe {
                name: name.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        let stamp = described
            .last_modified_time()
            .ok_or_else(|| CloudError::MissingLastModified {
                name: name.to_string(),
            })?;

        DateTime::from_timestamp(stamp.secs(), stamp.subsec_nanos()).ok_or_else(|| {
            CloudError::InvalidLastModified {
                name: name.to_string(),
            }
        })
    }

    async fn stop(&self, name: &str) -> Result<(), CloudError> {
        self.client
            .stop_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|err| CloudError::Stop {
                name: name.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        info!(instance = %name, "stop requested");
        Ok(())
    }
}
