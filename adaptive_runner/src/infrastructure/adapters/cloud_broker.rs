// /////////////////////////////////////////////////////////////////////////////
// Adaptive Runner RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cloud Queue Broker
//!
//! The cloud queue service transport (SQS) and its credential source.
//!
//! Credentials arrive as per-project subdirectories holding exactly two
//! non-hidden files: an AWS-format credentials file (access and secret
//! keys) and a config file naming the region. The source validates a
//! parsed credential with a live `list_queues` call before the project is
//! admitted, so a revoked key never reaches the service loop.
//!
//! Queue keys use the region as the server part; queue URLs are cached
//! per name as enumeration discovers them.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sqs::types::QueueAttributeName;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use adaptive_runner_domain::entities::{Project, ProjectId};
use adaptive_runner_domain::error::RunnerError;
use adaptive_runner_domain::services::{
    CredentialSource, MessageReceipt, QueueBroker, QueueDescriptor, QueueMessage,
};
use adaptive_runner_domain::value_objects::{QueueKey, QueueTransport};

/// Parsed cloud credential material, serialised into the project's
/// credential blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredential {
    /// Region the project's queues live in
    pub region: String,
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
}

impl CloudCredential {
    /// Parses the two credential files of a project subdirectory.
    ///
    /// File order does not matter; between them they must yield the
    /// region and both key halves.
    pub fn from_files(contents: &[String]) -> Result<Self, RunnerError> {
        let mut region = None;
        let mut access_key = None;
        let mut secret_key = None;

        for content in contents {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('[') || line.starts_with('#') {
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    continue;
                };
                let key = key.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                match key.as_str() {
                    "region" => region = Some(value),
                    "aws_access_key_id" => access_key = Some(value),
                    "aws_secret_access_key" => secret_key = Some(value),
                    _ => {}
                }
            }
        }

        match (region, access_key, secret_key) {
            (Some(region), Some(access_key), Some(secret_key)) => Ok(Self {
                region,
                access_key,
                secret_key,
            }),
            (region, access_key, secret_key) => Err(RunnerError::credential_error(format!(
                "cloud credential incomplete (region: {}, access key: {}, secret key: {})",
                region.is_some(),
                access_key.is_some(),
                secret_key.is_some()
            ))),
        }
    }

    /// Serialises the credential into the opaque blob carried by a
    /// `Project`
    pub fn to_blob(&self) -> Result<String, RunnerError> {
        serde_json::to_string(self).map_err(RunnerError::from)
    }

    /// Recovers a credential from a project blob
    pub fn from_blob(blob: &str) -> Result<Self, RunnerError> {
        serde_json::from_str(blob).map_err(RunnerError::from)
    }
}

fn sqs_client(credential: &CloudCredential) -> aws_sdk_sqs::Client {
    let config = aws_sdk_sqs::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(credential.region.clone()))
        .credentials_provider(Credentials::new(
            credential.access_key.clone(),
            credential.secret_key.clone(),
            None,
            None,
            "runner-credential-dir",
        ))
        .build();
    aws_sdk_sqs::Client::from_conf(config)
}

/// Credential source reading two-file project subdirectories
pub struct CloudCredentialSource {
    validation_deadline: Duration,
}

impl CloudCredentialSource {
    /// Creates a source that bounds credential validation by `deadline`
    pub fn new(deadline: Duration) -> Self {
        Self {
            validation_deadline: deadline,
        }
    }
}

#[async_trait]
impl CredentialSource for CloudCredentialSource {
    fn transport(&self) -> QueueTransport {
        QueueTransport::Cloud
    }

    async fn load(&self, project_dir: &Path) -> Result<Project, RunnerError> {
        let project_name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RunnerError::credential_error(format!(
                    "credential directory has no usable name: {}",
                    project_dir.display()
                ))
            })?
            .to_string();

        let mut entries = tokio::fs::read_dir(project_dir).await.map_err(|e| {
            RunnerError::credential_error(format!(
                "could not load credentials from {}: {}",
                project_dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(RunnerError::from)? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await.map_err(RunnerError::from)?.is_dir() {
                continue;
            }
            files.push(entry.path());
        }

        if files.len() != 2 {
            return Err(RunnerError::credential_error(format!(
                "subdirectory for cloud credentials contained {} not 2 files ({})",
                files.len(),
                project_dir.display()
            )));
        }

        let mut contents = Vec::new();
        for file in &files {
            contents.push(tokio::fs::read_to_string(file).await.map_err(|e| {
                RunnerError::credential_error(format!(
                    "could not read credential file {}: {}",
                    file.display(),
                    e
                ))
            })?);
        }

        let credential = CloudCredential::from_files(&contents)?;

        // A parsed credential is not necessarily a usable one.
        let client = sqs_client(&credential);
        tokio::time::timeout(self.validation_deadline, client.list_queues().send())
            .await
            .map_err(|_| {
                RunnerError::timeout(format!(
                    "credential validation for {} timed out",
                    project_name
                ))
            })?
            .map_err(|e| {
                RunnerError::credential_error(format!(
                    "unable to list queues for {}: {}",
                    project_name, e
                ))
            })?;

        Ok(Project::new(
            ProjectId::new(QueueTransport::Cloud, project_name),
            credential.to_blob()?,
        ))
    }
}

/// Cloud queue transport for one project's credential
pub struct CloudBroker {
    client: aws_sdk_sqs::Client,
    region: String,
    queue_urls: Mutex<HashMap<String, String>>,
}

impl CloudBroker {
    /// Creates a broker from a project credential blob
    pub fn from_blob(blob: &str) -> Result<Self, RunnerError> {
        let credential = CloudCredential::from_blob(blob)?;
        Ok(Self::new(&credential))
    }

    /// Creates a broker from parsed credential material
    pub fn new(credential: &CloudCredential) -> Self {
        Self {
            client: sqs_client(credential),
            region: credential.region.clone(),
            queue_urls: Mutex::new(HashMap::new()),
        }
    }

    async fn queue_url(&self, name: &str) -> Result<String, RunnerError> {
        if let Some(url) = self.queue_urls.lock().get(name) {
            return Ok(url.clone());
        }

        let response = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                RunnerError::queue_error(format!("queue url lookup for {} failed: {}", name, e))
            })?;
        let url = response
            .queue_url()
            .ok_or_else(|| {
                RunnerError::queue_error(format!("queue url lookup for {} was empty", name))
            })?
            .to_string();

        self.queue_urls.lock().insert(name.to_string(), url.clone());
        Ok(url)
    }

    async fn backlog_hint(&self, queue_url: &str) -> Option<u64> {
        let response = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .ok()?;
        response
            .attributes()?
            .get(&QueueAttributeName::ApproximateNumberOfMessages)?
            .parse()
            .ok()
    }
}

#[async_trait]
impl QueueBroker for CloudBroker {
    async fn enumerate(
        &self,
        matcher: Option<&Regex>,
        mismatcher: Option<&Regex>,
        deadline: Duration,
    ) -> Result<BTreeMap<QueueKey, QueueDescriptor>, RunnerError> {
        let response = tokio::time::timeout(deadline, self.client.list_queues().send())
            .await
            .map_err(|_| RunnerError::timeout("list queues timed out"))?
            .map_err(|e| RunnerError::queue_error(format!("list queues failed: {}", e)))?;

        let mut found = BTreeMap::new();
        for url in response.queue_urls() {
            let Some(name) = url.rsplit('/').next() else {
                continue;
            };
            if let Some(matcher) = matcher {
                if !matcher.is_match(name) {
                    continue;
                }
            }
            if let Some(mismatcher) = mismatcher {
                if mismatcher.is_match(name) {
                    continue;
                }
            }

            self.queue_urls
                .lock()
                .insert(name.to_string(), url.to_string());

            let key = QueueKey::new(self.region.clone(), name)?;
            let backlog = self.backlog_hint(url).await;
            found.insert(
                key,
                QueueDescriptor {
                    auth: String::new(),
                    backlog_hint: backlog,
                },
            );
        }

        debug!(region = %self.region, queues = found.len(), "cloud queues enumerated");
        Ok(found)
    }

    async fn pull_one(
        &self,
        queue: &QueueKey,
        deadline: Duration,
    ) -> Result<Option<QueueMessage>, RunnerError> {
        let queue_url = self.queue_url(queue.queue()).await?;

        let response = tokio::time::timeout(
            deadline,
            self.client
                .receive_message()
                .queue_url(&queue_url)
                .max_number_of_messages(1)
                .send(),
        )
        .await
        .map_err(|_| RunnerError::timeout(format!("receive on {} timed out", queue)))?
        .map_err(|e| RunnerError::queue_error(format!("receive on {} failed: {}", queue, e)))?;

        let Some(message) = response.messages().first() else {
            return Ok(None);
        };

        let receipt_handle = message.receipt_handle().ok_or_else(|| {
            RunnerError::queue_error(format!("message on {} carried no receipt", queue))
        })?;

        Ok(Some(QueueMessage {
            id: message
                .message_id()
                .map(str::to_string)
                .unwrap_or_else(|| receipt_handle.to_string()),
            queue: queue.clone(),
            body: message.body().unwrap_or_default().as_bytes().to_vec(),
            receipt: MessageReceipt::Cloud {
                receipt_handle: receipt_handle.to_string(),
            },
        }))
    }

    async fn ack(&self, message: &QueueMessage) -> Result<(), RunnerError> {
        let MessageReceipt::Cloud { receipt_handle } = &message.receipt else {
            return Err(RunnerError::queue_error("foreign receipt"));
        };
        let queue_url = self.queue_url(message.queue.queue()).await?;
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                RunnerError::queue_error(format!("delete of {} failed: {}", message.id, e))
            })?;
        Ok(())
    }

    async fn nack(&self, message: &QueueMessage, requeue: bool) -> Result<(), RunnerError> {
        let MessageReceipt::Cloud { receipt_handle } = &message.receipt else {
            return Err(RunnerError::queue_error("foreign receipt"));
        };
        if !requeue {
            return self.ack(message).await;
        }
        let queue_url = self.queue_url(message.queue.queue()).await?;
        // Zero visibility puts the message straight back into rotation.
        self.client
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| {
                RunnerError::queue_error(format!("requeue of {} failed: {}", message.id, e))
            })?;
        Ok(())
    }

    async fn publish(
        &self,
        routing_key: &str,
        _content_type: &str,
        payload: &[u8],
    ) -> Result<(), RunnerError> {
        let queue_url = self.queue_url(routing_key).await?;
        self.client
            .send_message()
            .queue_url(queue_url)
            .message_body(String::from_utf8_lossy(payload).into_owned())
            .send()
            .await
            .map_err(|e| {
                RunnerError::queue_error(format!("send to {} failed: {}", routing_key, e))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_parse_across_files() {
        let credentials_file =
            "[default]\naws_access_key_id = AKIA123\naws_secret_access_key = shhh\n";
        let config_file = "[default]\nregion = us-west-2\n";
        let credential = CloudCredential::from_files(&[
            credentials_file.to_string(),
            config_file.to_string(),
        ])
        .unwrap();
        assert_eq!(credential.region, "us-west-2");
        assert_eq!(credential.access_key, "AKIA123");
        assert_eq!(credential.secret_key, "shhh");
    }

    #[test]
    fn test_credential_incomplete() {
        let err =
            CloudCredential::from_files(&["region = us-west-2\n".to_string()]).unwrap_err();
        assert_eq!(err.category(), "credentials");
    }

    #[test]
    fn test_credential_blob_round_trip() {
        let credential = CloudCredential {
            region: "eu-central-1".to_string(),
            access_key: "AKIA456".to_string(),
            secret_key: "secret".to_string(),
        };
        let blob = credential.to_blob().unwrap();
        assert_eq!(CloudCredential::from_blob(&blob).unwrap(), credential);
    }

    #[tokio::test]
    async fn test_load_rejects_wrong_file_count() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj-a");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("credentials"), "aws_access_key_id = x\n").unwrap();
        // A hidden file must not count toward the expected pair.
        std::fs::write(project.join(".hidden"), "ignored").unwrap();

        let source = CloudCredentialSource::new(Duration::from_secs(1));
        let err = source.load(&project).await.unwrap_err();
        assert_eq!(err.category(), "credentials");
        assert!(err.to_string().contains("1 not 2"));
    }
}
