use std::{rc::Rc, sync::mpsc};

use boa_engine::{Context, JsError};
use boa_runtime::extensions::{ConsoleExtension, MicrotaskExtension, TimeoutExtension};

use crate::js::{EngineError, JsEngine, JsEngineClient, esm::BuiltinModuleLoader};

pub struct JsEngineBuilder {
    extensions: Vec<Box<dyn JsEngineExtension>>,
}

impl Default for JsEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngineBuilder {
    pub fn new() -> Self {
        JsEngineBuilder { extensions: vec![] }
    }

    pub fn with_extension(mut self, extension: impl JsEngineExtension) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn build(self) -> Result<JsEngine, EngineError> {
        let (sender, receiver) = mpsc::channel();
        let client = JsEngineClient { sender };
        let extensions = self.extensions;
        let context_client = client.clone();

        Ok(JsEngine {
            client,
            context_builder: Box::new(move || build_context(&extensions, context_client)),
            receiver,
        })
    }
}

/// Something that installs native functions or shims into a fresh context.
pub trait JsEngineExtension: Send + Sync + 'static {
    fn register(&self, context: &mut Context, client: JsEngineClient) -> Result<(), JsError>;
}

fn build_context(
    extensions: &[Box<dyn JsEngineExtension>],
    client: JsEngineClient,
) -> Result<Context, JsError> {
    let mut context = Context::builder()
        .module_loader(Rc::new(BuiltinModuleLoader::new()))
        .build()?;

    // Register Boa runtime extensions
    boa_runtime::register(
        (
            ConsoleExtension::default(),
            TimeoutExtension {},
            MicrotaskExtension {},
        ),
        None,
        &mut context,
    )?;

    for extension in extensions {
        extension.register(&mut context, client.clone())?;
    }

    Ok(context)
}
