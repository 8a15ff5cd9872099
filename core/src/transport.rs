//! The byte-stream bound sessions are built over (§4.2).
//!
//! A session needs to read and write its connection concurrently — one
//! task feeding the incremental decoder, a separate writer task draining
//! the [`crate::write_serializer::WriteSerializer`] queue — so rather than
//! a trait object juggled behind a shared lock, sessions take an owned
//! `AsyncRead + AsyncWrite` stream and split it with [`tokio::io::split`]
//! once at construction. `Transport` just names that bound.

use tokio::io::{AsyncRead, AsyncWrite};

/// Any stream a session can be driven over: a real socket, a Unix-domain
/// connection, or (in tests) a `tokio::io::DuplexStream` / the testkit's
/// `FlakyWriter`.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<S> Transport for S where S: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
