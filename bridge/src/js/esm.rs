use boa_engine::module::ModuleLoader;
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsString, Module, Source};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Module loader serving modules registered by extensions (such as
/// `"websocket"`), falling back to files on disk for relative imports.
pub(crate) struct BuiltinModuleLoader {
    local_modules: RefCell<HashMap<String, Module>>,
}

impl BuiltinModuleLoader {
    pub(crate) fn new() -> Self {
        Self {
            local_modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn insert(&self, specifier: impl Into<String>, module: Module) {
        let specifier = specifier.into();
        self.local_modules
            .borrow_mut()
            .insert(specifier.clone(), module);
        log::debug!("Cached local module: {}", specifier);
    }
}

impl ModuleLoader for BuiltinModuleLoader {
    fn init_import_meta(
        self: Rc<Self>,
        import_meta: &JsObject,
        module: &Module,
        context: &mut Context,
    ) {
        let Some(module_path) = module.path().map(|path| path.to_string_lossy().to_string()) else {
            return;
        };

        // Set import_meta.url = module.path
        if let Err(e) = import_meta.set(JsString::from("url"), JsString::from(module_path), false, context) {
            log::warn!("Failed to set 'url' in import_meta: {:?}", e);
        }
    }

    async fn load_imported_module(
        self: std::rc::Rc<Self>,
        referrer: boa_engine::module::Referrer,
        specifier: boa_engine::JsString,
        context: &std::cell::RefCell<&mut boa_engine::Context>,
    ) -> boa_engine::JsResult<boa_engine::Module> {
        let spec_str = specifier.to_std_string_lossy();

        // Builtin modules are addressed by bare specifier.
        if let Some(module) = self.local_modules.borrow().get(&spec_str) {
            return Ok(module.clone());
        }

        let resolved = match referrer.path() {
            Some(path) if !spec_str.starts_with('/') => {
                let base = Path::new(path);
                base.parent().unwrap_or(base).join(&spec_str)
            }
            _ => PathBuf::from(&spec_str),
        };
        let resolved_specifier = resolved.to_string_lossy().to_string();

        log::debug!("Resolved specifier {} to {}", spec_str, resolved_specifier);

        if let Some(module) = self.local_modules.borrow().get(&resolved_specifier) {
            return Ok(module.clone());
        }

        let body = std::fs::read_to_string(&resolved).map_err(|e| {
            JsError::from_native(
                JsNativeError::typ()
                    .with_message(format!("Cannot find module '{}': {}", spec_str, e)),
            )
        })?;

        let src = Source::from_bytes(body.as_bytes()).with_path(&resolved);
        let module = Module::parse(src, None, &mut context.borrow_mut())?;

        self.insert(resolved_specifier, module.clone());
        Ok(module)
    }
}
