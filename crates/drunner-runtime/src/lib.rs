//! drunner: instala, atualiza, remove e faz backup de dServices
//!
//! Um dService é uma aplicação descrita por um `dservice.toml` embutido na
//! imagem principal, com volumes gerenciados, configuração tipada e hooks
//! que o próprio serviço implementa (ver `drunner-sdk`).

pub mod archive;
pub mod backup;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod manifest;
pub mod outcome;
pub mod paths;
pub mod runtime;
pub mod service;
pub mod validate;
pub mod volumes;

#[cfg(test)]
pub mod testing;

pub use archive::{ArchiveCodec, Archiver, Passphrase};
pub use backup::BackupRestore;
pub use context::OperationContext;
pub use error::{DrunnerError, Result};
pub use lifecycle::Lifecycle;
pub use outcome::Outcome;
pub use paths::DrunnerPaths;
pub use runtime::{ContainerRuntime, DockerCli};
