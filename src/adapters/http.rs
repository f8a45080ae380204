use crate::domain::model::Provider;
use crate::domain::ports::{HttpRequest, HttpResponse, Method, Transport};
use crate::utils::error::{QslError, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("qslkit/", env!("CARGO_PKG_VERSION"));

/// Blocking `reqwest` transport. The client timeout is disabled; callers that need one
/// impose it outside the library.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| QslError::Config {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, provider: Provider, request: &HttpRequest) -> Result<HttpResponse> {
        // Parameters carry credentials, so only their count is logged.
        tracing::debug!(
            "{provider}: {:?} {} ({} query, {} form params{})",
            request.method,
            request.url,
            request.query.len(),
            request.form.len(),
            if request.file.is_some() { ", file" } else { "" }
        );

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.file {
            Some(file) => {
                let part = Part::bytes(file.contents.clone()).file_name(file.file_name.clone());
                let form = request
                    .form
                    .iter()
                    .fold(Form::new(), |form, (k, v)| form.text(k.clone(), v.clone()))
                    .part(file.field.clone(), part);
                builder.multipart(form)
            }
            None if !request.form.is_empty() => builder.form(&request.form),
            None => builder,
        };

        let response = builder
            .send()
            .map_err(|e| QslError::from_transport(provider, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| QslError::from_transport(provider, e))?;

        tracing::debug!("{provider}: HTTP {status}, {} bytes", body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Maps a non-2xx response to the error taxonomy: 401/403 are credential rejections,
/// anything else is a remote failure.
pub fn check_status(provider: Provider, response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    match response.status {
        401 | 403 => Err(QslError::auth(provider, snippet(&response.body))),
        s => Err(QslError::remote(provider, Some(s), snippet(&response.body))),
    }
}

/// First line of a body, bounded, for error messages.
pub fn snippet(body: &str) -> String {
    let line = body.trim().lines().next().unwrap_or_default();
    line.chars().take(200).collect()
}

#[cfg(test)]
pub(crate) mod stub {
    //! Scripted transport for adapter unit tests.
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, status: u16, body: &str) -> Self {
            self.responses.lock().unwrap().push_back(HttpResponse {
                status,
                body: body.to_string(),
            });
            self
        }

        pub fn request(&self, index: usize) -> HttpRequest {
            self.requests.lock().unwrap()[index].clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for StubTransport {
        fn execute(&self, provider: Provider, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| QslError::remote(provider, None, "no scripted response"))
        }
    }
}
