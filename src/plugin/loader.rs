//! Dynamic library plugin loader
//!
//! Module implements the loading seam over `libloading`. Plugins are
//! shared libraries exporting a declaration symbol (identity metadata)
//! and a create symbol (the start/stop handle). The lifecycle manager
//! never touches this mechanism directly; it goes through the
//! `PluginLoader` trait.

use crate::error::{HostError, HostResult};
use crate::plugin::types::{PluginDescriptor, PluginHandle, PluginLoader, PluginPackage};
use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::ffi::CStr;
use std::os::raw::c_char;
use tracing::{error, info};

/// Symbol exporting the plugin's identity metadata
pub const DECLARATION_SYMBOL: &[u8] = b"_plugin_host_declaration\0";

/// Symbol constructing the plugin's handle
pub const CREATE_SYMBOL: &[u8] = b"_plugin_host_create\0";

/// Identity record exported by plugin libraries
///
/// Both strings must be NUL-terminated and live for the lifetime of the
/// library ('static in the plugin crate).
#[repr(C)]
pub struct PluginDeclaration {
    pub id: *const c_char,
    pub version: *const c_char,
}

type DeclarationFn = unsafe extern "C" fn() -> *const PluginDeclaration;
type CreateFn = unsafe extern "C" fn() -> *mut Box<dyn PluginHandle>;

/// `PluginLoader` implementation backed by `libloading`
#[derive(Debug, Default)]
pub struct LibraryLoader;

impl LibraryLoader {
    pub fn new() -> Self {
        Self
    }
}

impl PluginLoader for LibraryLoader {
    fn resolve(&self, package: &PluginPackage) -> HostResult<PluginDescriptor> {
        // Trial load: the library is dropped again once metadata is out
        let library = unsafe {
            Library::new(&package.path).map_err(|e| {
                error!("Failed to open {}: {}", package.path.display(), e);
                HostError::invalid_package(format!("unreadable package: {e}"))
            })?
        };

        let declaration_fn: Symbol<DeclarationFn> = unsafe {
            library.get(DECLARATION_SYMBOL).map_err(|e| {
                error!(
                    "Package {} missing declaration symbol: {}",
                    package.path.display(),
                    e
                );
                HostError::invalid_package("missing _plugin_host_declaration export")
            })?
        };

        let descriptor = unsafe {
            let declaration = declaration_fn();
            if declaration.is_null() {
                return Err(HostError::invalid_package("null plugin declaration"));
            }
            let declaration = &*declaration;
            if declaration.id.is_null() || declaration.version.is_null() {
                return Err(HostError::invalid_package("incomplete plugin declaration"));
            }
            PluginDescriptor {
                id: CStr::from_ptr(declaration.id).to_string_lossy().into_owned(),
                version: CStr::from_ptr(declaration.version)
                    .to_string_lossy()
                    .into_owned(),
            }
        };

        if descriptor.id.is_empty() {
            return Err(HostError::invalid_package("empty plugin id"));
        }

        info!(
            "Resolved {} -> {}",
            package.path.display(),
            descriptor
        );
        Ok(descriptor)
    }

    fn instantiate(
        &self,
        package: &PluginPackage,
        descriptor: &PluginDescriptor,
    ) -> HostResult<Box<dyn PluginHandle>> {
        let library = unsafe {
            Library::new(&package.path)
                .map_err(|e| HostError::failed(format!("load {}: {e}", descriptor.id)))?
        };

        let create_fn: Symbol<CreateFn> = unsafe {
            library.get(CREATE_SYMBOL).map_err(|e| {
                error!("Package {} missing create symbol: {}", package.path.display(), e);
                HostError::invalid_package("missing _plugin_host_create export")
            })?
        };

        let instance = unsafe {
            let raw = create_fn();
            if raw.is_null() {
                return Err(HostError::invalid_package("plugin creation returned null"));
            }
            *Box::from_raw(raw)
        };

        info!("Instantiated plugin {} v{}", descriptor.id, descriptor.version);

        // The library must outlive the instance created from it
        Ok(Box::new(LibraryBackedHandle {
            instance,
            _library: library,
        }))
    }
}

/// Handle that keeps its originating library loaded
struct LibraryBackedHandle {
    instance: Box<dyn PluginHandle>,
    _library: Library,
}

#[async_trait]
impl PluginHandle for LibraryBackedHandle {
    async fn start(&mut self) -> HostResult<()> {
        self.instance.start().await
    }

    async fn stop(&mut self) -> HostResult<()> {
        self.instance.stop().await
    }
}

/// Declare the exports a plugin library must provide
///
/// ```ignore
/// plugin_host::declare_plugin!("sample", "1.0", SamplePlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($id:expr, $version:expr, $constructor:path) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _plugin_host_declaration()
        -> *const $crate::plugin::loader::PluginDeclaration {
            static DECLARATION: $crate::plugin::loader::PluginDeclaration =
                $crate::plugin::loader::PluginDeclaration {
                    id: concat!($id, "\0").as_ptr() as *const ::std::os::raw::c_char,
                    version: concat!($version, "\0").as_ptr() as *const ::std::os::raw::c_char,
                };
            &DECLARATION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _plugin_host_create()
        -> *mut ::std::boxed::Box<dyn $crate::plugin::PluginHandle> {
            let handle: ::std::boxed::Box<dyn $crate::plugin::PluginHandle> =
                ::std::boxed::Box::new($constructor());
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(handle))
        }
    };
}

// SAFETY: the declaration pointers reference 'static data in the plugin
// library, which LibraryBackedHandle keeps loaded.
unsafe impl Send for PluginDeclaration {}
unsafe impl Sync for PluginDeclaration {}
