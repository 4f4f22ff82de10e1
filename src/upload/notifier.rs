use async_trait::async_trait;

/// Local user notification. The identifier is fixed per assignment so a
/// repeat replaces the previous notification instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub identifier: String,
    pub title: String,
    pub body: String,
    /// Deep-link back into the app
    pub route: Option<String>,
}

impl Notification {
    pub fn submission_completed(course_id: &str, assignment_id: &str) -> Self {
        Self {
            identifier: format!("completed-submission-{course_id}-{assignment_id}"),
            title: "Assignment submitted!".to_string(),
            body: "Your files were uploaded and the assignment was submitted successfully."
                .to_string(),
            route: Some(format!("/courses/{course_id}/assignments/{assignment_id}")),
        }
    }

    pub fn submission_failed(course_id: &str, assignment_id: &str) -> Self {
        Self {
            identifier: format!("failed-submission-{course_id}-{assignment_id}"),
            title: "Assignment submission failed!".to_string(),
            body: "Something went wrong with an assignment submission.".to_string(),
            route: Some(format!("/courses/{course_id}/assignments/{assignment_id}")),
        }
    }

    pub fn upload_failed() -> Self {
        Self {
            identifier: "upload-manager".to_string(),
            title: "Failed to send files!".to_string(),
            body: "Something went wrong with uploading files.".to_string(),
            route: None,
        }
    }
}

/// Raises user-facing notifications. The host platform supplies the real
/// presenter; the default just logs.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            identifier = %notification.identifier,
            route = notification.route.as_deref().unwrap_or(""),
            "{}: {}",
            notification.title,
            notification.body,
        );
    }
}
