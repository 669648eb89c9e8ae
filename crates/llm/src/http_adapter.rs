use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use snafu::{OptionExt, ResultExt};

use super::decode::Utf8ChunkDecoder;
use super::provider::{
    BoxFuture, BuildClientSnafu, HTTP_PROVIDER_ID, HealthPayloadSnafu, HealthStatus,
    InvalidContentTypeSnafu, PreparedRequest, ProviderConfig, ProviderResult, ReadStreamSnafu,
    RecommendationProvider, RecommendationStream, SendRequestSnafu, StreamEvent, TimedOutSnafu,
    UnexpectedStatusSnafu,
};

const PROMPT_FIELD: &str = "prompt";
const IMAGES_FIELD: &str = "images";

/// Talks to the recommendation service over multipart POST and a raw text body stream.
pub struct HttpRecommendationProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HttpRecommendationProvider {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context(BuildClientSnafu {
                stage: "http-adapter-new",
            })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_form(request: PreparedRequest) -> ProviderResult<Form> {
        let mut form = Form::new().text(PROMPT_FIELD, request.prompt);

        for attachment in request.attachments {
            let part = Part::bytes(attachment.bytes.to_vec())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.content_type)
                .context(InvalidContentTypeSnafu {
                    stage: "build-multipart-form",
                    file_name: attachment.file_name.clone(),
                    content_type: attachment.content_type.clone(),
                })?;
            form = form.part(IMAGES_FIELD, part);
        }

        Ok(form)
    }

    async fn open_response(
        client: &reqwest::Client,
        config: &ProviderConfig,
        request: PreparedRequest,
    ) -> ProviderResult<reqwest::Response> {
        let url = config.recommend_url();
        let attachment_count = request.attachments.len();
        let form = Self::build_form(request)?;

        tracing::info!(%url, attachment_count, "issuing recommendation request");

        let response = with_timeout(
            config.request_timeout,
            "await-response-headers",
            client.post(&url).multipart(form).send(),
        )
        .await?
        .context(SendRequestSnafu {
            stage: "send-recommend-request",
            url: url.clone(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                stage: "recommend-http-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response)
    }
}

impl RecommendationProvider for HttpRecommendationProvider {
    fn id(&self) -> &str {
        HTTP_PROVIDER_ID
    }

    fn recommend(&self, request: PreparedRequest) -> RecommendationStream {
        let client = self.client.clone();
        let config = self.config.clone();

        Box::pin(async_stream::stream! {
            let response = match Self::open_response(&client, &config, request).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(error = %error, "recommendation request failed before streaming");
                    yield StreamEvent::Failed(error);
                    return;
                }
            };

            yield StreamEvent::Opened;

            let mut body = Box::pin(response.bytes_stream());
            let mut decoder = Utf8ChunkDecoder::default();
            let mut chunk_count = 0usize;

            loop {
                let next = match with_timeout(
                    config.request_timeout,
                    "await-stream-chunk",
                    body.next(),
                )
                .await
                {
                    Ok(next) => next,
                    Err(error) => {
                        tracing::error!(chunk_count, error = %error, "recommendation stream stalled");
                        yield StreamEvent::Failed(error);
                        return;
                    }
                };

                let Some(next) = next else {
                    break;
                };

                match next.context(ReadStreamSnafu {
                    stage: "read-stream-chunk",
                }) {
                    Ok(buffer) => {
                        if let Some(text) = decoder.push(&buffer) {
                            chunk_count += 1;
                            yield StreamEvent::Chunk(text);
                        }
                    }
                    Err(error) => {
                        tracing::error!(chunk_count, error = %error, "recommendation stream broke");
                        yield StreamEvent::Failed(error);
                        return;
                    }
                }
            }

            if let Some(text) = decoder.finish() {
                chunk_count += 1;
                yield StreamEvent::Chunk(text);
            }

            tracing::info!(chunk_count, "recommendation stream done");
            yield StreamEvent::Completed;
        })
    }

    fn health<'a>(&'a self) -> BoxFuture<'a, ProviderResult<HealthStatus>> {
        Box::pin(async move {
            let url = self.config.health_url();
            let response = with_timeout(
                self.config.request_timeout,
                "await-health-response",
                self.client.get(&url).send(),
            )
            .await?
            .context(SendRequestSnafu {
                stage: "send-health-request",
                url: url.clone(),
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return UnexpectedStatusSnafu {
                    stage: "health-http-status",
                    status: status.as_u16(),
                    body,
                }
                .fail();
            }

            response
                .json::<HealthStatus>()
                .await
                .context(HealthPayloadSnafu {
                    stage: "decode-health-payload",
                })
        })
    }
}

async fn with_timeout<F>(
    limit: Option<Duration>,
    stage: &'static str,
    future: F,
) -> ProviderResult<F::Output>
where
    F: Future,
{
    match limit {
        Some(after) => tokio::time::timeout(after, future)
            .await
            .ok()
            .context(TimedOutSnafu { stage, after }),
        None => Ok(future.await),
    }
}
