use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use url::Url;
use crate::upload::errors::{Result, UploadError};
use crate::upload::record::UploadContext;
use super::types::{
    ApiSubmission,
    CreateSubmissionBody,
    FileUploadTarget,
    PutCommentBody,
    UploadTargetRequest,
};

/// REST surface the upload pipeline depends on. Kept behind a trait so
/// tests can stand in for the server.
#[async_trait]
pub trait LmsApi: Send + Sync {
    /// Negotiate a short-lived upload target for a file. The target is
    /// single-use and time-limited, so an error here is terminal for
    /// the attempt.
    async fn request_upload_target(
        &self,
        context: &UploadContext,
        body: &UploadTargetRequest,
    ) -> Result<FileUploadTarget>;

    /// Finalize a file submission referencing the uploaded file ids.
    async fn create_submission(
        &self,
        course_id: &str,
        assignment_id: &str,
        body: &CreateSubmissionBody,
    ) -> Result<ApiSubmission>;

    /// Attach a comment (text, media or file ids) to an existing submission.
    async fn put_submission_comment(
        &self,
        course_id: &str,
        assignment_id: &str,
        user_id: &str,
        body: &PutCommentBody,
    ) -> Result<ApiSubmission>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn create_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| UploadError::Param("Invalid access token".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// 上传地址可能是相对路径，需要拼接源站
    fn resolve_upload_url(&self, mut target: FileUploadTarget) -> Result<FileUploadTarget> {
        if !target.upload_url.starts_with("http") {
            let url = Url::parse(&self.base_url)
                .map_err(|_| UploadError::InvalidTarget(format!("Invalid base url: {}", self.base_url)))?;
            let origin = url.origin().ascii_serialization();
            target.upload_url = format!("{}{}", origin, target.upload_url);
        }

        Ok(target)
    }
}

#[async_trait]
impl LmsApi for ApiClient {
    async fn request_upload_target(
        &self,
        context: &UploadContext,
        body: &UploadTargetRequest,
    ) -> Result<FileUploadTarget> {
        let response = self
            .client
            .post(self.endpoint(&context.files_path()))
            .headers(self.create_headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(
                status.as_u16(),
                "Failed to request upload target",
            ));
        }

        let target = response.json::<FileUploadTarget>().await?;
        self.resolve_upload_url(target)
    }

    async fn create_submission(
        &self,
        course_id: &str,
        assignment_id: &str,
        body: &CreateSubmissionBody,
    ) -> Result<ApiSubmission> {
        let path = format!("courses/{course_id}/assignments/{assignment_id}/submissions");
        let response = self
            .client
            .post(self.endpoint(&path))
            .headers(self.create_headers()?)
            .json(body)
            .send()
            .await?;

        // The submission is only considered created on 201.
        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(UploadError::server_error(
                status.as_u16(),
                "Failed to create submission",
            ));
        }

        Ok(response.json::<ApiSubmission>().await?)
    }

    async fn put_submission_comment(
        &self,
        course_id: &str,
        assignment_id: &str,
        user_id: &str,
        body: &PutCommentBody,
    ) -> Result<ApiSubmission> {
        let path = format!("courses/{course_id}/assignments/{assignment_id}/submissions/{user_id}");
        let response = self
            .client
            .put(self.endpoint(&path))
            .headers(self.create_headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::server_error(
                status.as_u16(),
                "Failed to attach submission comment",
            ));
        }

        Ok(response.json::<ApiSubmission>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn client() -> ApiClient {
        ApiClient::new("https://canvas.example.edu/", "token-1")
    }

    #[test]
    fn test_endpoint_joins_api_prefix() {
        let client = client();
        assert_eq!(
            client.endpoint("courses/1/files"),
            "https://canvas.example.edu/api/v1/courses/1/files"
        );
    }

    #[test]
    fn test_resolve_relative_upload_url() {
        let client = client();
        let target = FileUploadTarget {
            upload_url: "/files_api/upload".to_string(),
            upload_params: HashMap::new(),
        };

        let resolved = client.resolve_upload_url(target).unwrap();
        assert_eq!(resolved.upload_url, "https://canvas.example.edu/files_api/upload");
    }

    #[test]
    fn test_resolve_keeps_absolute_upload_url() {
        let client = client();
        let target = FileUploadTarget {
            upload_url: "https://s3.example.com/bucket".to_string(),
            upload_params: HashMap::new(),
        };

        let resolved = client.resolve_upload_url(target).unwrap();
        assert_eq!(resolved.upload_url, "https://s3.example.com/bucket");
    }
}
