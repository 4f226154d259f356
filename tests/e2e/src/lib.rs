//! End-to-end tests wiring the load generator against the ingestion service
//! over real sockets. The tests live under `tests/`.
