extern crate gxlate;

fn main() {
    gxlate::cli::run();
}
