/// Application name
pub const APP_NAME: &str = "Herbario UTPL";

/// Maximum number of image files accepted in a single request
pub const MAX_UPLOAD_FILES: usize = 5;

/// Maximum size of a single uploaded image in bytes (10 MiB)
pub const MAX_UPLOAD_FILE_SIZE: usize = 10 * 1024 * 1024;

/// MIME types accepted by upload intake
pub const ALLOWED_IMAGE_MIMES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// Bounding box of the primary image variant (fit inside, never enlarged)
pub const PRIMARY_MAX_WIDTH: u32 = 1200;
pub const PRIMARY_MAX_HEIGHT: u32 = 1200;

/// Exact size of the thumbnail variant (crop to fill)
pub const THUMBNAIL_WIDTH: u32 = 300;
pub const THUMBNAIL_HEIGHT: u32 = 300;

/// Lossy WebP quality (0-100) of the primary and thumbnail variants
pub const PRIMARY_WEBP_QUALITY: f32 = 80.0;
pub const THUMBNAIL_WEBP_QUALITY: f32 = 70.0;

/// MIME type of every stored image variant
pub const OUTPUT_IMAGE_MIME: &str = "image/webp";

/// File extension of every stored image variant
pub const OUTPUT_IMAGE_EXT: &str = "webp";

/// URL prefix under which file-mode variants are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads/images";

/// QR artifact geometry and palette
pub const QR_SIZE_PX: u32 = 400;
pub const QR_MARGIN_MODULES: u32 = 2;
pub const QR_DARK_RGB: [u8; 3] = [0x2d, 0x50, 0x16];
pub const QR_LIGHT_RGB: [u8; 3] = [0xff, 0xff, 0xff];

/// Pagination for authenticated list queries
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Pagination for public list queries
pub const PUBLIC_DEFAULT_LIMIT: u32 = 10;
pub const PUBLIC_MAX_LIMIT: u32 = 50;

/// Number of families reported by collection stats
pub const STATS_TOP_FAMILIES: usize = 10;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Path segment under the public base URL that resolves a specimen
pub const PUBLIC_SPECIMEN_PATH: &str = "/public/specimen";
