pub mod pb {
    tonic::include_proto!("llm");
}

use crate::app::dispatch::Dispatcher;
use crate::core::error::{Error, ErrorKind};
use crate::core::generation::{GenerationRequest, DEFAULT_MAX_LENGTH, DEFAULT_TEMPERATURE};
use pb::llm_service_server::{LlmService, LlmServiceServer};
use std::future::Future;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{transport::Server, Code, Request, Response, Status};

pub struct GrpcService {
    dispatcher: Dispatcher,
}

impl GrpcService {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn into_server(self) -> LlmServiceServer<Self> {
        LlmServiceServer::new(self)
    }

    fn status(&self, err: Error) -> Status {
        let code = code_for(self.dispatcher.classify(&err));
        if code == Code::Internal {
            tracing::warn!(error = %err, "rpc failed");
        }
        Status::new(code, err.to_string())
    }
}

pub fn code_for(kind: ErrorKind) -> Code {
    match kind {
        ErrorKind::NotFound => Code::NotFound,
        ErrorKind::InvalidRequest => Code::InvalidArgument,
        ErrorKind::Timeout => Code::DeadlineExceeded,
        ErrorKind::LoadFailed | ErrorKind::InferenceFailed | ErrorKind::Internal => Code::Internal,
    }
}

/// Proto3 cannot tell "unset" from zero, so zero means "use the default".
fn generation_request(req: pb::TextRequest) -> Result<GenerationRequest, Error> {
    let max_length = match req.max_length {
        0 => DEFAULT_MAX_LENGTH,
        n if n > 0 => n as usize,
        n => {
            return Err(Error::InvalidRequest(format!(
                "max_length must be positive, got {}",
                n
            )))
        }
    };
    let temperature = if req.temperature == 0.0 {
        DEFAULT_TEMPERATURE
    } else {
        f64::from(req.temperature)
    };

    Ok(GenerationRequest {
        prompt: req.prompt,
        model_name: Some(req.model_name).filter(|name| !name.is_empty()),
        max_length,
        temperature,
    })
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[tonic::async_trait]
impl LlmService for GrpcService {
    async fn generate_text(
        &self,
        request: Request<pb::TextRequest>,
    ) -> Result<Response<pb::TextResponse>, Status> {
        let req = generation_request(request.into_inner()).map_err(|e| self.status(e))?;

        let result = self
            .dispatcher
            .generate(req)
            .await
            .map_err(|e| self.status(e))?;

        Ok(Response::new(pb::TextResponse {
            generated_text: result.generated_text,
            tokens_generated: to_i32(result.tokens_generated),
        }))
    }

    async fn get_model_info(
        &self,
        request: Request<pb::ModelInfoRequest>,
    ) -> Result<Response<pb::ModelInfoResponse>, Status> {
        let name = request.into_inner().model_name;

        let info = self
            .dispatcher
            .model_info(&name)
            .await
            .map_err(|e| self.status(e))?;

        Ok(Response::new(pb::ModelInfoResponse {
            model_name: info.model_name,
            max_length: to_i32(info.max_length),
            architecture: info.architecture,
        }))
    }
}

pub async fn serve<F>(listener: TcpListener, dispatcher: Dispatcher, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr()?;
    tracing::info!("gRPC server listening on {}", addr);

    Server::builder()
        .add_service(GrpcService::new(dispatcher).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    tracing::info!("gRPC server on {} stopped", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_request(max_length: i32, temperature: f32) -> pb::TextRequest {
        pb::TextRequest {
            prompt: "Hello".to_string(),
            model_name: String::new(),
            max_length,
            temperature,
        }
    }

    #[test]
    fn test_zero_values_take_defaults() {
        let req = generation_request(text_request(0, 0.0)).unwrap();
        assert_eq!(req.max_length, 128);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.model_name, None);
        assert_eq!(req, generation_request(text_request(128, 0.0)).unwrap());
    }

    #[test]
    fn test_explicit_values_kept() {
        let req = generation_request(pb::TextRequest {
            model_name: "qwen3".to_string(),
            ..text_request(64, 1.5)
        })
        .unwrap();
        assert_eq!(req.max_length, 64);
        assert_eq!(req.temperature, 1.5);
        assert_eq!(req.model_name.as_deref(), Some("qwen3"));
    }

    #[test]
    fn test_negative_max_length_rejected() {
        let err = generation_request(text_request(-1, 0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(code_for(err.kind()), Code::InvalidArgument);
    }

    #[test]
    fn test_codes() {
        assert_eq!(code_for(ErrorKind::NotFound), Code::NotFound);
        assert_eq!(code_for(ErrorKind::LoadFailed), Code::Internal);
        assert_eq!(code_for(ErrorKind::Timeout), Code::DeadlineExceeded);
    }
}
