//! Service methods and their call shapes.

use std::fmt;

use crate::proto::SERVICE_NAME;

/// Cardinality of a method's request and response sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// One request, one response.
    Unary,
    /// One request, many responses.
    ServerStreaming,
    /// Many requests, one response.
    ClientStreaming,
    /// Many requests, many responses.
    Bidirectional,
}

impl CallShape {
    pub fn is_streaming(self) -> bool {
        !matches!(self, CallShape::Unary)
    }
}

/// A method of `greeter.v1.Greeter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Greet,
    GreetStream,
    CollectGreet,
    GreetChat,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::Greet,
        Method::GreetStream,
        Method::CollectGreet,
        Method::GreetChat,
    ];

    /// Method name as it appears in the route.
    pub fn name(self) -> &'static str {
        match self {
            Method::Greet => "Greet",
            Method::GreetStream => "GreetStream",
            Method::CollectGreet => "CollectGreet",
            Method::GreetChat => "GreetChat",
        }
    }

    /// HTTP/2 path, e.g. `/greeter.v1.Greeter/Greet`.
    pub fn path(self) -> &'static str {
        match self {
            Method::Greet => "/greeter.v1.Greeter/Greet",
            Method::GreetStream => "/greeter.v1.Greeter/GreetStream",
            Method::CollectGreet => "/greeter.v1.Greeter/CollectGreet",
            Method::GreetChat => "/greeter.v1.Greeter/GreetChat",
        }
    }

    pub fn shape(self) -> CallShape {
        match self {
            Method::Greet => CallShape::Unary,
            Method::GreetStream => CallShape::ServerStreaming,
            Method::CollectGreet => CallShape::ClientStreaming,
            Method::GreetChat => CallShape::Bidirectional,
        }
    }

    /// Resolve a request path to a method.
    pub fn from_path(path: &str) -> Option<Method> {
        let (service, name) = path.strip_prefix('/')?.split_once('/')?;
        if service != SERVICE_NAME {
            return None;
        }
        Method::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
