use std::time::Duration;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use super::{CommandChannel, CommandError};

const COMMAND_PATH: &str = "/visualize_grpc_pb.VisualizeGrpcService/Command";

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandRequest {
    #[prost(string, tag = "1")]
    pub command: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CommandResponse {
    #[prost(string, repeated, tag = "1")]
    pub output: Vec<String>,
}

/// gRPC channel to the visualizer's `Command` service
#[derive(Debug, Clone)]
pub struct GrpcChannel {
    endpoint: String,
    grpc: Grpc<Channel>,
}

impl GrpcChannel {
    /// Connects to `host:port`, failing once `timeout` elapses.
    ///
    /// This is the only wait on the visualizer; later commands never block
    /// on reconnection.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, CommandError> {
        let endpoint = format!("http://{addr}");
        info!("Connecting to visualizer command service at {endpoint}");

        let unavailable = |reason: String| CommandError::Unavailable {
            endpoint: endpoint.clone(),
            timeout,
            reason,
        };

        let target = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| CommandError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?
            .connect_timeout(timeout);

        let channel = match tokio::time::timeout(timeout, target.connect()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(unavailable(e.to_string())),
            Err(_) => return Err(unavailable("timed out".to_string())),
        };

        debug!("Visualizer command channel ready");
        Ok(Self {
            endpoint: endpoint.clone(),
            grpc: Grpc::new(channel),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CommandChannel for GrpcChannel {
    async fn command(&self, command: &str) -> Result<Vec<String>, CommandError> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| CommandError::Transport(e.to_string()))?;

        let request = tonic::Request::new(CommandRequest {
            command: command.to_string(),
        });
        let path = http::uri::PathAndQuery::from_static(COMMAND_PATH);
        let codec = ProstCodec::<CommandRequest, CommandResponse>::default();
        let response = grpc.unary(request, path, codec).await?;

        Ok(response.into_inner().output)
    }
}
