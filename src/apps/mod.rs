//! Traffic generators.

pub mod echo;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use echo::{AppAction, EchoClient, EchoServer, CLIENT_LOG_TARGET, SERVER_LOG_TARGET};

use crate::ip::Datagram;
use crate::sim::SimTime;

/// Index of an installed application within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub usize);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app{}", self.0)
    }
}

/// The applications a node can run.
#[derive(Debug, Clone)]
pub enum Application {
    EchoServer(EchoServer),
    EchoClient(EchoClient),
}

impl Application {
    pub fn start(&mut self, now: SimTime) -> Vec<AppAction> {
        match self {
            Application::EchoServer(server) => server.start(now),
            Application::EchoClient(client) => client.start(now),
        }
    }

    pub fn stop(&mut self, now: SimTime) -> Vec<AppAction> {
        match self {
            Application::EchoServer(server) => server.stop(now),
            Application::EchoClient(client) => client.stop(now),
        }
    }

    pub fn on_receive(&mut self, now: SimTime, datagram: &Datagram) -> Vec<AppAction> {
        match self {
            Application::EchoServer(server) => server.on_receive(now, datagram),
            Application::EchoClient(client) => client.on_receive(now, datagram),
        }
    }

    /// Only clients arm a send timer; servers ignore it.
    pub fn on_send_timer(&mut self, now: SimTime) -> Vec<AppAction> {
        match self {
            Application::EchoServer(_) => Vec::new(),
            Application::EchoClient(client) => client.on_send_timer(now),
        }
    }

    pub fn as_client(&self) -> Option<&EchoClient> {
        match self {
            Application::EchoClient(client) => Some(client),
            Application::EchoServer(_) => None,
        }
    }

    pub fn as_server(&self) -> Option<&EchoServer> {
        match self {
            Application::EchoServer(server) => Some(server),
            Application::EchoClient(_) => None,
        }
    }
}
