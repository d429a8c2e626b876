use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not read {_0}")]
    Comic(#[error(not(source))] String),
    #[display("could not write {_0}")]
    Output(#[error(not(source))] String),
}
