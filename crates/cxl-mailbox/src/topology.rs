use crate::MailboxContext;

/// Port layout of the switch a switch CCI belongs to.
pub trait SwitchTopology: Send {
    fn upstream_port(&self) -> u8;

    /// Ids of the downstream switch ports.
    fn downstream_ports(&self) -> Vec<u8>;

    /// Mailbox of the device directly attached below downstream port `port`.
    fn leaf_mailbox(&mut self, port: u8) -> Option<&mut MailboxContext>;
}

#[derive(Debug)]
struct DownstreamPort {
    id: u8,
    leaf: Option<MailboxContext>,
}

/// A fixed switch whose topology owns the leaf devices' mailboxes.
#[derive(Debug)]
pub struct StaticTopology {
    upstream: u8,
    ports: Vec<DownstreamPort>,
}

impl StaticTopology {
    pub fn new(upstream: u8) -> Self {
        Self {
            upstream,
            ports: Vec::new(),
        }
    }

    /// Adds a downstream port, optionally with a device attached.
    pub fn with_port(mut self, id: u8, leaf: Option<MailboxContext>) -> Self {
        self.ports.push(DownstreamPort { id, leaf });
        self
    }
}

impl SwitchTopology for StaticTopology {
    fn upstream_port(&self) -> u8 {
        self.upstream
    }

    fn downstream_ports(&self) -> Vec<u8> {
        self.ports.iter().map(|p| p.id).collect()
    }

    fn leaf_mailbox(&mut self, port: u8) -> Option<&mut MailboxContext> {
        self.ports
            .iter_mut()
            .find(|p| p.id == port)
            .and_then(|p| p.leaf.as_mut())
    }
}
