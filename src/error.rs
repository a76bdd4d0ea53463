#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot reach process {pid} -- is it running with the pulse runtime? ({source})")]
    Connect {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("exchange with process {pid} failed: {source}")]
    Exchange {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
