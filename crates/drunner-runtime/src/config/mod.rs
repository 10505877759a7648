//! Configuração tipada: definições, variáveis e stores persistidos.

mod definition;
mod service_vars;
mod store;
mod variables;

pub use definition::{ConfigType, ConfigurationDefinition};
pub use service_vars::{
    GlobalSettings, ServiceVars, DEFAULT_UTILS_IMAGE, DEVMODE, IMAGENAME, PULLIMAGES, SERVICENAME,
    UTILSIMAGE,
};
pub use store::ConfigStore;
pub use variables::Variables;
