fn main() {
    postflop_cfr::cli::run();
}
