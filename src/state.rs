use std::sync::Arc;

use crate::config::Config;
use crate::llm::openrouter::OpenRouterClient;
use crate::prompt::enhance::PromptEnhancer;
use crate::templates::loader::TemplateLoader;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub enhancer: Arc<PromptEnhancer>,
    pub loader: Arc<TemplateLoader>,
}

impl AppState {
    pub fn new(config: Arc<Config>, enhancer: PromptEnhancer, loader: TemplateLoader) -> Self {
        AppState {
            config,
            enhancer: Arc::new(enhancer),
            loader: Arc::new(loader),
        }
    }

    pub fn from_config(config: Arc<Config>) -> Self {
        let enhancer = PromptEnhancer::new(OpenRouterClient::from_config(&config));
        let loader = TemplateLoader::from_config(&config);
        AppState::new(config, enhancer, loader)
    }
}
