use serde::{Deserialize, Serialize};

use crate::expr::{try_map_lambda, Expr, Lambda};

use super::leaves::{gather_leaves, join_path, map_leaves, Leaf};

pub const OUTER_PREFIX: &str = "$outer";
pub const INNER_PREFIX: &str = "$inner";

/// The shape a select produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Fully evaluated by the database.
    Server(Expr),
    /// `client` runs over each materialized row of `server`.
    Client {
        server: Box<Projection>,
        client: Lambda,
    },
    /// A join result selector that could not be translated, applied to the
    /// materialized outer and inner rows.
    Composite {
        outer: Box<Projection>,
        inner: Box<Projection>,
        result: Lambda,
    },
}

impl Projection {
    /// The projection as one expression, with client lambdas inlined over
    /// their server parts.
    pub fn flatten(&self) -> Expr {
        match self {
            Projection::Server(body) => body.clone(),
            Projection::Client { server, client } => client.expand(&[server.flatten()]),
            Projection::Composite {
                outer,
                inner,
                result,
            } => result.expand(&[outer.flatten(), inner.flatten()]),
        }
    }

    /// Apply `lambda` to this projection on the client.
    pub fn merge(&self, lambda: Lambda) -> Projection {
        Projection::Client {
            server: Box::new(self.clone()),
            client: lambda,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Projection::Server(_))
    }

    /// The leaves the database has to produce for this projection.
    pub fn server_leaves(&self) -> Vec<Leaf> {
        self.server_leaves_at("")
    }

    pub(crate) fn server_leaves_at(&self, path: &str) -> Vec<Leaf> {
        match self {
            Projection::Server(body) => gather_leaves(body, path),
            Projection::Client { server, .. } => server.server_leaves_at(path),
            Projection::Composite { outer, inner, .. } => {
                let mut leaves = outer.server_leaves_at(&join_path(path, OUTER_PREFIX));
                leaves.extend(inner.server_leaves_at(&join_path(path, INNER_PREFIX)));
                leaves
            }
        }
    }

    /// Rebuild with each server leaf replaced by `f(path, leaf)`, using the
    /// same paths as [`Projection::server_leaves`]. Client lambdas are kept.
    pub fn map_server_leaves(&self, f: &mut dyn FnMut(&str, Expr) -> Expr) -> Projection {
        self.map_server_leaves_at("", f)
    }

    fn map_server_leaves_at(&self, path: &str, f: &mut dyn FnMut(&str, Expr) -> Expr) -> Projection {
        match self {
            Projection::Server(body) => Projection::Server(map_leaves(body.clone(), path, f)),
            Projection::Client { server, client } => Projection::Client {
                server: Box::new(server.map_server_leaves_at(path, f)),
                client: client.clone(),
            },
            Projection::Composite {
                outer,
                inner,
                result,
            } => Projection::Composite {
                outer: Box::new(outer.map_server_leaves_at(&join_path(path, OUTER_PREFIX), f)),
                inner: Box::new(inner.map_server_leaves_at(&join_path(path, INNER_PREFIX), f)),
                result: result.clone(),
            },
        }
    }

    /// Apply `f` to the server-evaluated bodies only.
    pub fn map_server_bodies(&self, f: &mut dyn FnMut(Expr) -> Expr) -> Projection {
        match self {
            Projection::Server(body) => Projection::Server(f(body.clone())),
            Projection::Client { server, client } => Projection::Client {
                server: Box::new(server.map_server_bodies(f)),
                client: client.clone(),
            },
            Projection::Composite {
                outer,
                inner,
                result,
            } => Projection::Composite {
                outer: Box::new(outer.map_server_bodies(f)),
                inner: Box::new(inner.map_server_bodies(f)),
                result: result.clone(),
            },
        }
    }

    pub fn try_map_exprs<E, F>(self, f: &mut F) -> Result<Projection, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        Ok(match self {
            Projection::Server(body) => Projection::Server(f(body)?),
            Projection::Client { server, client } => Projection::Client {
                server: Box::new(server.try_map_exprs(f)?),
                client: try_map_lambda(client, f)?,
            },
            Projection::Composite {
                outer,
                inner,
                result,
            } => Projection::Composite {
                outer: Box::new(outer.try_map_exprs(f)?),
                inner: Box::new(inner.try_map_exprs(f)?),
                result: try_map_lambda(result, f)?,
            },
        })
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Projection::Server(body) => vec![body],
            Projection::Client { server, client } => {
                let mut exprs = server.exprs();
                exprs.push(&client.body);
                exprs
            }
            Projection::Composite {
                outer,
                inner,
                result,
            } => {
                let mut exprs = outer.exprs();
                exprs.extend(inner.exprs());
                exprs.push(&result.body);
                exprs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{client_call, column, param, record};

    #[test]
    fn test_flatten_inlines_client_lambda() {
        let server = Projection::Server(record(vec![("A", column("t", "A"))]));
        let client = Lambda::new(
            vec!["x".into()],
            client_call("Format", vec![param("x").member("A")]),
        );
        let projection = server.merge(client);
        assert_eq!(
            projection.flatten(),
            client_call("Format", vec![column("t", "A")])
        );
        // the database still produces only the server part
        assert_eq!(projection.server_leaves().len(), 1);
    }

    #[test]
    fn test_composite_leaves_are_prefixed() {
        let projection = Projection::Composite {
            outer: Box::new(Projection::Server(record(vec![("A", column("o", "A"))]))),
            inner: Box::new(Projection::Server(record(vec![("B", column("i", "B"))]))),
            result: Lambda::new(
                vec!["o".into(), "i".into()],
                client_call("Pair", vec![param("o"), param("i")]),
            ),
        };
        let names: Vec<String> = projection.server_leaves().iter().map(Leaf::name).collect();
        assert_eq!(names, vec!["$outer.A".to_string(), "$inner.B".to_string()]);
    }
}
