//! Source discovery services

pub mod cache;
pub mod encryption;
pub mod keyed;
pub mod logging;
pub mod quality_scorer;
pub mod ranking;
pub mod rate_limiter;
pub mod release_parser;
pub mod request;
pub mod source_resolver;

pub use cache::{SharedCache, TtlCache, cached, create_cache, traced};
pub use encryption::{CryptoError, FieldCodec, NonceMode};
pub use keyed::KeyedStore;
pub use logging::{LogFormat, LoggingConfig, init_tracing};
pub use quality_scorer::{AvailabilityTier, QualityAssessment, assess, format_file_size};
pub use ranking::{Rankable, RankingOptions, filter_sources};
pub use rate_limiter::{AdaptiveRateLimiter, LimitKey, RateLimitStats, RateLimiterConfig};
pub use release_parser::{MediaKind, ParsedRelease, Resolution, SourceType, parse_release, parse_title};
pub use request::{
    HttpResponse, RequestClientConfig, RequestError, RequestOptions, ResilientRequestClient,
    ResponseBody,
};
pub use source_resolver::{ResolvedSource, RevealedSource, SourceResolver, dedupe};
