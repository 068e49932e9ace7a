use crate::cache::{NetworkParamsTable, ServiceIpTable};
use crate::connection::DaemonConnection;

/// State shared by the dispatcher, the event pipeline and the
/// service-IP refresher.
pub struct Context {
    pub connection: DaemonConnection,
    pub networks: NetworkParamsTable,
    pub service_ips: ServiceIpTable,
    /// Docker network driver name of the SDN plugin.
    pub network_type: String,
}

impl Context {
    pub fn new(connection: DaemonConnection, network_type: impl Into<String>) -> Self {
        Self {
            connection,
            networks: NetworkParamsTable::new(),
            service_ips: ServiceIpTable::new(),
            network_type: network_type.into(),
        }
    }
}
