pub fn default_enabled() -> bool {
    true
}

pub fn default_service_name() -> String {
    "storefront".to_string()
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    8080
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_shutdown_timeout() -> u64 {
    30
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_postgres_port() -> u16 {
    5432
}

pub fn default_ssl_mode() -> String {
    "require".to_string()
}

pub fn default_max_connections() -> u32 {
    20
}

pub fn default_connection_timeout() -> u64 {
    30
}

pub fn default_user_query_limit() -> usize {
    200
}

pub fn default_fallback_scan_limit() -> usize {
    1000
}

pub fn default_admin_list_limit() -> usize {
    1000
}

pub fn default_total_tolerance() -> String {
    "0.01".to_string()
}

pub fn default_channel_capacity() -> usize {
    64
}

pub fn default_poll_interval() -> u64 {
    30
}

pub fn default_connected_grace() -> u64 {
    60
}

pub fn default_min_poll_interval() -> u64 {
    5
}

pub fn default_user_header() -> String {
    "x-user-id".to_string()
}

pub fn default_email_header() -> String {
    "x-user-email".to_string()
}

pub fn default_name_header() -> String {
    "x-user-name".to_string()
}
