use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry point kind '{0}' not recognised (expected 'gateway' or 'proxy')")]
    UnknownKind(String),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("front end server failed: {0}")]
    Serve(#[source] std::io::Error),
}
