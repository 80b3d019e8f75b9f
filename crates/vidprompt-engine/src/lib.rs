pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod normalizer;
pub mod pipeline;
pub mod recorder;
pub mod slots;
pub mod transport;

pub use config::{AppConfig, GatewayConfig, ProtocolFamily};
pub use error::{GatewayError, GenerateError};
pub use gateway::{GatewayClient, NO_RESPONSE_PLACEHOLDER};
pub use normalizer::{normalize_image, NormalizeError, NormalizedImage};
pub use pipeline::{Generation, PromptEngine};
pub use recorder::HistoryRecorder;
pub use slots::{SlotBoard, SlotError};
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};
