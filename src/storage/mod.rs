pub mod weight_file;
