mod bootstrap;
mod settings;

pub(crate) use bootstrap::build_app;
