pub mod middleware_viewer_header;
