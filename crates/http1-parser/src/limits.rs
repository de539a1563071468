//! Validated, bounded server configuration.
//!
//! `HttpServerOptions` holds the raw, validated option values; on
//! construction it is frozen into an `HttpRequestLimits` snapshot that the
//! parser consults on every state transition. Re-validating per byte would
//! be wasteful, so limits are a plain copy taken once per connection.

use crate::error::ServerOptionError;

const INT32_MAX: i64 = i32::MAX as i64;
const INT64_MAX: i64 = i64::MAX;
const U16_MAX: i64 = u16::MAX as i64;
const MAX_FIELD_LINES: i64 = 128;

fn ideal_thread_count() -> i64 {
    std::thread::available_parallelism().map(|n| n.get() as i64).unwrap_or(1)
}

/// One entry's validation band. `zero_means` documents what a value of
/// zero does for that option (it's either "default", "disabled",
/// "unlimited", or, for `TcpServerBacklogSize`, nothing — zero is simply
/// rejected there).
struct Band {
    name: &'static str,
    min: i64,
    max: i64,
    zero_rejected: bool,
}

macro_rules! server_options {
    ($($field:ident = $default:expr;)*) => {
        /// Validated server configuration. Each setter either accepts the
        /// new value or leaves the prior one in place and records why.
        #[derive(Debug, Clone)]
        pub struct HttpServerOptions {
            $(pub(crate) $field: i64,)*
            last_error: Option<String>,
        }

        impl Default for HttpServerOptions {
            fn default() -> Self {
                Self {
                    $($field: $default,)*
                    last_error: None,
                }
            }
        }

        impl HttpServerOptions {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn last_error(&self) -> Option<&str> {
                self.last_error.as_deref()
            }

            $(
                pub fn $field(&self) -> i64 {
                    self.$field
                }
            )*

            fn validate(&self, band: &Band, value: i64) -> Result<i64, ServerOptionError> {
                if value < 0 {
                    return Err(ServerOptionError::Negative { option: band.name });
                }
                if value == 0 && band.zero_rejected {
                    return Err(ServerOptionError::BelowMinimum { option: band.name, min: 1 });
                }
                if value > band.max {
                    return Err(ServerOptionError::AboveMaximum { option: band.name, max: band.max });
                }
                Ok(value)
            }
        }
    };
}

server_options! {
    worker_count = 0;
    tcp_server_backlog_size = 128;
    idle_timeout_in_secs = 0;
    request_timeout_in_secs = 0;
    max_url_size = 8192;
    max_chunk_metadata_size = 1024;
    max_request_size = 0;
    max_body_size = 0;
    max_connection_count = 0;
    max_header_name_size = 256;
    max_trailer_name_size = 256;
    max_header_value_size = 8192;
    max_trailer_value_size = 8192;
    max_header_line_count = 100;
    max_trailer_line_count = 100;
}

/// `worker_count` is special-cased because its maximum (the host's ideal
/// thread count) is only known at call time, not as a `const`.
impl HttpServerOptions {
    pub fn set_worker_count(&mut self, value: i64) -> Result<(), ServerOptionError> {
        let band = Band { name: "WorkerCount", min: 0, max: ideal_thread_count(), zero_rejected: false };
        match self.validate(&band, value) {
            Ok(v) => {
                self.worker_count = v;
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn set_tcp_server_backlog_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("TcpServerBacklogSize", value, 1, INT32_MAX, true, |s, v| s.tcp_server_backlog_size = v)
    }

    pub fn set_idle_timeout_in_secs(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("IdleTimeoutInSecs", value, 0, INT32_MAX, false, |s, v| s.idle_timeout_in_secs = v)
    }

    pub fn set_request_timeout_in_secs(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("RequestTimeoutInSecs", value, 0, INT32_MAX, false, |s, v| s.request_timeout_in_secs = v)
    }

    pub fn set_max_url_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxUrlSize", value, 0, INT64_MAX, false, |s, v| s.max_url_size = v)
    }

    pub fn set_max_chunk_metadata_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxChunkMetadataSize", value, 0, INT64_MAX, false, |s, v| s.max_chunk_metadata_size = v)
    }

    pub fn set_max_request_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxRequestSize", value, 0, INT64_MAX, false, |s, v| s.max_request_size = v)
    }

    pub fn set_max_body_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxBodySize", value, 0, INT64_MAX, false, |s, v| s.max_body_size = v)
    }

    pub fn set_max_connection_count(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxConnectionCount", value, 0, INT64_MAX, false, |s, v| s.max_connection_count = v)
    }

    pub fn set_max_header_name_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxHeaderNameSize", value, 0, U16_MAX, false, |s, v| s.max_header_name_size = v)
    }

    pub fn set_max_trailer_name_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxTrailerNameSize", value, 0, U16_MAX, false, |s, v| s.max_trailer_name_size = v)
    }

    pub fn set_max_header_value_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxHeaderValueSize", value, 0, U16_MAX, false, |s, v| s.max_header_value_size = v)
    }

    pub fn set_max_trailer_value_size(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxTrailerValueSize", value, 0, U16_MAX, false, |s, v| s.max_trailer_value_size = v)
    }

    pub fn set_max_header_line_count(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxHeaderLineCount", value, 0, MAX_FIELD_LINES, false, |s, v| s.max_header_line_count = v)
    }

    pub fn set_max_trailer_line_count(&mut self, value: i64) -> Result<(), ServerOptionError> {
        self.set_bounded("MaxTrailerLineCount", value, 0, MAX_FIELD_LINES, false, |s, v| s.max_trailer_line_count = v)
    }

    fn set_bounded(
        &mut self,
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
        zero_rejected: bool,
        apply: impl FnOnce(&mut Self, i64),
    ) -> Result<(), ServerOptionError> {
        let band = Band { name, min, max, zero_rejected };
        match self.validate(&band, value) {
            Ok(v) => {
                apply(self, v);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Freezes the currently-validated options into the parser-facing
    /// limits snapshot taken at connection start.
    pub fn to_limits(&self) -> HttpRequestLimits {
        HttpRequestLimits {
            max_url_size: as_unlimited(self.max_url_size),
            max_chunk_metadata_size: as_unlimited(self.max_chunk_metadata_size),
            max_request_size: as_unlimited(self.max_request_size),
            max_body_size: as_unlimited(self.max_body_size),
            max_header_name_size: self.max_header_name_size as usize,
            max_trailer_name_size: self.max_trailer_name_size as usize,
            max_header_value_size: self.max_header_value_size as usize,
            max_trailer_value_size: self.max_trailer_value_size as usize,
            max_header_line_count: as_unlimited_usize(self.max_header_line_count),
            max_trailer_line_count: as_unlimited_usize(self.max_trailer_line_count),
        }
    }
}

fn as_unlimited(value: i64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value as u64)
    }
}

fn as_unlimited_usize(value: i64) -> Option<usize> {
    if value == 0 {
        None
    } else {
        Some(value as usize)
    }
}

/// Limits the parser actually checks against, frozen from
/// [`HttpServerOptions`] at connection start. `None` means unlimited. Zero
/// values for the size-bounded options mean unlimited in the options map,
/// so they translate to `None` here (the one exception,
/// `TcpServerBacklogSize`, never reaches the parser — it belongs to the
/// out-of-scope TCP listener).
#[derive(Debug, Clone)]
pub struct HttpRequestLimits {
    pub max_url_size: Option<u64>,
    pub max_chunk_metadata_size: Option<u64>,
    pub max_request_size: Option<u64>,
    pub max_body_size: Option<u64>,
    pub max_header_name_size: usize,
    pub max_trailer_name_size: usize,
    pub max_header_value_size: usize,
    pub max_trailer_value_size: usize,
    pub max_header_line_count: Option<usize>,
    pub max_trailer_line_count: Option<usize>,
}

impl Default for HttpRequestLimits {
    fn default() -> Self {
        HttpServerOptions::default().to_limits()
    }
}
