//! Kubernetes Event recording for network reconciliation.
//!
//! Every create, tag, attribute change and delete emits an Event on the
//! ClusterNetwork being reconciled. Events are fire-and-forget: failures are
//! logged as warnings and never fail the pass.

use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`. Never returns an error.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    client: Client,
    reporter: Reporter,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: None,
            },
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            resource_ref.clone(),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Discards every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Keeps published events in memory so tests can assert on them
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                warning: matches!(type_, EventType::Warning),
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    pub const SUCCESSFUL_CREATE_VPC: &str = "SuccessfulCreateVPC";
    pub const FAILED_CREATE_VPC: &str = "FailedCreateVPC";
    pub const SUCCESSFUL_TAG_VPC: &str = "SuccessfulTagVPC";
    pub const FAILED_TAG_VPC: &str = "FailedTagVPC";
    pub const SUCCESSFUL_SET_VPC_ATTRIBUTES: &str = "SuccessfulSetVPCAttributes";
    pub const FAILED_SET_VPC_ATTRIBUTES: &str = "FailedSetVPCAttributes";
    pub const SUCCESSFUL_DELETE_VPC: &str = "SuccessfulDeleteVPC";
    pub const FAILED_DELETE_VPC: &str = "FailedDeleteVPC";
    pub const SUCCESSFUL_CREATE_SUBNET: &str = "SuccessfulCreateSubnet";
    pub const FAILED_CREATE_SUBNET: &str = "FailedCreateSubnet";
    pub const SUCCESSFUL_TAG_SUBNET: &str = "SuccessfulTagSubnet";
    pub const FAILED_TAG_SUBNET: &str = "FailedTagSubnet";
    pub const SUCCESSFUL_MODIFY_SUBNET_ATTRIBUTES: &str = "SuccessfulModifySubnetAttributes";
    pub const FAILED_MODIFY_SUBNET_ATTRIBUTES: &str = "FailedModifySubnetAttributes";
    pub const FAILED_NO_PRIVATE_SUBNET: &str = "FailedNoPrivateSubnet";
    pub const FAILED_NO_PUBLIC_SUBNET: &str = "FailedNoPublicSubnet";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const TAG: &str = "Tag";
    pub const MODIFY: &str = "Modify";
    pub const DELETE: &str = "Delete";
    pub const RECONCILE: &str = "Reconcile";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<RecordingEventPublisher>();
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingEventPublisher::new();
        let obj_ref = ObjectReference::default();

        publisher
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::SUCCESSFUL_CREATE_VPC,
                actions::CREATE,
                Some("Created new managed VPC \"vpc-1\"".to_string()),
            )
            .await;
        publisher
            .publish(&obj_ref, EventType::Warning, reasons::FAILED_TAG_VPC, actions::TAG, None)
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert!(!events[0].warning);
        assert!(events[1].warning);
        assert_eq!(
            publisher.reasons(),
            vec!["SuccessfulCreateVPC".to_string(), "FailedTagVPC".to_string()]
        );
    }
}
