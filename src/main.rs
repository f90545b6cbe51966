fn main() -> Result<(), Box<dyn std::error::Error>> {
    reprise::runtime::run()
}
