//! Build status notifications on the issue tracker.

mod client;
mod labels;
mod message;
mod templates;

pub use client::{
    NotificationClient, NotifierSettings, TargetIdentity, artifact_identity, comment_issue,
};
pub use labels::LabelDelta;
pub use message::{
    AdditionalInfo, MAX_ADDITIONAL_INFO, StatusReport, base_message, compose_comment,
    format_additional_info,
};
pub use templates::{COMPONENT_REPORT, ISO_REPORT, MessageTemplates, TEMPLATE_REPORT, render};
