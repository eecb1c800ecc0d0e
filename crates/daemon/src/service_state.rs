use std::sync::Arc;

use store::Store;

use crate::proxy::Proxy;

/// Shared state of a store process.
#[derive(Clone)]
pub struct StoreState {
    store: Arc<Store>,
}

impl StoreState {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Shared state of a proxy process.
#[derive(Clone)]
pub struct ProxyState {
    proxy: Arc<Proxy>,
}

impl ProxyState {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}
