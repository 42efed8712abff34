//! # Tipos MIME
//! src/http/mime.rs
//!
//! Deducción del `Content-Type` a partir de la extensión del archivo, usando
//! la tabla de `mime_guess` (sin distinguir mayúsculas).

use mime_guess::Mime;
use std::path::Path;

/// Retorna el tipo MIME para el path según su extensión
/// (`application/octet-stream` si es desconocida o no existe)
///
/// # Ejemplo
/// ```
/// use static_server::http::mime::mime_type;
/// use std::path::Path;
///
/// assert_eq!(mime_type(Path::new("/srv/www/index.html")).essence_str(), "text/html");
/// assert_eq!(mime_type(Path::new("/srv/www/LICENSE")).essence_str(), "application/octet-stream");
/// ```
pub fn mime_type(path: &Path) -> Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
