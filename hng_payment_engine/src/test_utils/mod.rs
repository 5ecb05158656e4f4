pub mod builders;
pub mod prepare_env;
