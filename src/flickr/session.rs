use bytes::Bytes;

use super::error::ApiError;

/// A completed HTTP exchange: whatever status the server sent plus the body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Minimal async GET transport used by the photo API client.
///
/// Non-2xx statuses are returned as responses, not errors; only failures
/// where no response arrived map to `ApiError::Transport`.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, ApiError>;
}

#[async_trait::async_trait]
impl HttpTransport for reqwest::Client {
    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, ApiError> {
        let transport_err = |e: reqwest::Error| ApiError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let resp = reqwest::Client::get(self, url)
            .query(query)
            .send()
            .await
            .map_err(transport_err)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(transport_err)?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Scripted transport for tests. Responses are queued per URL; the last
    /// queued response for a URL repeats once the queue is down to one.
    /// Unscripted URLs answer 404.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<HashMap<String, VecDeque<Result<HttpResponse, ApiError>>>>,
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, status: u16, body: impl Into<Bytes>) {
            self.push(
                url,
                Ok(HttpResponse {
                    status,
                    body: body.into(),
                }),
            );
        }

        pub fn fail(&self, url: &str, message: &str) {
            self.push(
                url,
                Err(ApiError::Transport {
                    url: url.to_string(),
                    message: message.to_string(),
                }),
            );
        }

        pub fn clear(&self, url: &str) {
            self.responses.lock().unwrap().remove(url);
        }

        fn push(&self, url: &str, response: Result<HttpResponse, ApiError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(u, _)| u == url)
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_query(&self) -> Option<Vec<(String, String)>> {
            self.calls.lock().unwrap().last().map(|(_, q)| q.clone())
        }

        /// Values sent for query parameter `name`, in call order.
        pub fn query_values(&self, name: &str) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, q)| q.iter().filter(|(k, _)| k == name).map(|(_, v)| v.clone()))
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(&str, String)],
        ) -> Result<HttpResponse, ApiError> {
            self.calls.lock().unwrap().push((
                url.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Ok(HttpResponse {
                    status: 404,
                    body: Bytes::new(),
                }),
            }
        }
    }
}
