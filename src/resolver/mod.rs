//! # Resolución Segura de Paths
//! src/resolver/mod.rs
//!
//! Traduce el path de un request a un archivo dentro del document root y
//! rechaza todo lo que escape de él (`..`, symlinks hacia afuera, etc.).
//!
//! ## Arquitectura
//!
//! ```text
//! "/a/../b.html" → quitar '/' iniciales → root + "/a/../b.html"
//!                → canonicalize ─ ok ──→ ¿dentro del root? → Safe | Rejected
//!                               └ falla → canonicalize(padre)
//!                                         → ¿dentro del root? → Safe(sin canonicalizar) | Rejected
//! ```
//!
//! El segundo nivel existe para no exigir que el recurso pedido exista: un
//! archivo ausente dentro del root se acepta (y luego da 404 al abrirlo),
//! uno ausente fuera del root se rechaza igual.
//!
//! "Dentro" es una comparación por componentes: el root `/srv/www` no
//! contiene a `/srv/www-backup`.

use crate::error::{Result, ServerError};
use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Resultado de resolver un path pedido
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Path absoluto confinado al root
    Safe(PathBuf),

    /// El path escapa del root (o su padre no se puede resolver)
    Rejected,
}

impl Resolution {
    #[cfg(test)]
    pub(crate) fn is_safe(&self) -> bool {
        matches!(self, Resolution::Safe(_))
    }
}

/// Resolver atado a un document root canonicalizado una sola vez
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Canonicaliza el root
    ///
    /// Un root inválido es un error de inicialización, no un rechazo por
    /// request.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|source| ServerError::InvalidRoot {
            path: root.to_path_buf(),
            source,
        })?;

        Ok(Self { root: canonical })
    }

    /// Root canonicalizado
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resuelve `requested` (el path del request) contra el root
    ///
    /// # Ejemplo
    /// ```no_run
    /// use static_server::resolver::{PathResolver, Resolution};
    ///
    /// let resolver = PathResolver::new("/srv/www").unwrap();
    /// assert_eq!(resolver.resolve("/../../etc/passwd"), Resolution::Rejected);
    /// ```
    pub fn resolve(&self, requested: &str) -> Resolution {
        let joined = self.join(requested);

        if let Ok(canonical) = fs::canonicalize(&joined) {
            return if self.contains(&canonical) {
                Resolution::Safe(canonical)
            } else {
                Resolution::Rejected
            };
        }

        // El destino no existe (o no se puede resolver): validar el padre
        let Some(parent) = parent_of(&joined) else {
            return Resolution::Rejected;
        };

        match fs::canonicalize(parent) {
            Ok(parent) if self.contains(&parent) => Resolution::Safe(joined),
            _ => Resolution::Rejected,
        }
    }

    /// `root + "/" + requested` sin los '/' iniciales del request
    fn join(&self, requested: &str) -> PathBuf {
        let relative = requested.trim_start_matches('/');

        let mut bytes = self.root.as_os_str().as_bytes().to_vec();
        bytes.push(b'/');
        bytes.extend_from_slice(relative.as_bytes());

        PathBuf::from(OsStr::from_bytes(&bytes))
    }

    /// Igual al root o debajo de él, componente a componente
    fn contains(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.root)
    }
}

/// Atajo para resolver una sola vez contra un root dado
pub fn resolve(root: impl AsRef<Path>, requested: &str) -> Result<Resolution> {
    Ok(PathResolver::new(root)?.resolve(requested))
}

/// Texto hasta el último separador, ignorando separadores finales
///
/// Es un corte textual a propósito: `"/www/a/.."` da `"/www/a"`, igual que
/// haría el string sin normalizar.
fn parent_of(path: &Path) -> Option<&Path> {
    let bytes = path.as_os_str().as_bytes();

    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b'/' {
        end -= 1;
    }

    let slash = bytes[..end].iter().rposition(|&b| b == b'/')?;
    if slash == 0 {
        return None;
    }

    Some(Path::new(OsStr::from_bytes(&bytes[..slash])))
}
